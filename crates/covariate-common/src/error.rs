//! Error types for the covariate pipeline.

use thiserror::Error;

/// Result type alias using CovariateError.
pub type CovResult<T> = Result<T, CovariateError>;

/// Primary error type for covariate acquisition and alignment.
#[derive(Debug, Error)]
pub enum CovariateError {
    // === Alignment Errors ===
    #[error("Invalid reference grid: {0}")]
    InvalidGrid(String),

    #[error("Layer '{0}' has no coordinate reference system")]
    UndefinedCrs(String),

    #[error("No covariates supplied")]
    EmptyInput,

    #[error("None of the {0} supplied covariate elements is a raster")]
    NoValidLayers(usize),

    // === Collaborator Errors ===
    #[error("Unknown tool or variable: {0}")]
    UnknownTool(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tool executable not found: {0}")]
    ToolNotFound(String),

    #[error("Tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("Download failed: {0}")]
    Download(String),

    // === Data Errors ===
    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Invalid raster data: {0}")]
    Format(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CovariateError {
    /// Whether the error reflects a caller mistake (bad input, config) as
    /// opposed to an environmental failure.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            CovariateError::InvalidGrid(_)
                | CovariateError::UndefinedCrs(_)
                | CovariateError::EmptyInput
                | CovariateError::NoValidLayers(_)
                | CovariateError::UnknownTool(_)
                | CovariateError::MissingCredential(_)
                | CovariateError::InvalidGeometry(_)
                | CovariateError::InvalidArgument(_)
        )
    }
}

impl From<std::io::Error> for CovariateError {
    fn from(err: std::io::Error) -> Self {
        CovariateError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CovariateError {
    fn from(err: serde_json::Error) -> Self {
        CovariateError::Format(format!("JSON error: {}", err))
    }
}

impl From<crate::crs::CrsParseError> for CovariateError {
    fn from(err: crate::crs::CrsParseError) -> Self {
        CovariateError::Projection(err.to_string())
    }
}
