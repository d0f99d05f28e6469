//! Error types for raster file reading and writing.

use covariate_common::CovariateError;
use thiserror::Error;

/// Result type for raster I/O operations.
pub type RasterIoResult<T> = Result<T, RasterIoError>;

/// Error types for GeoTIFF decoding and encoding.
#[derive(Error, Debug)]
pub enum RasterIoError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from the TIFF decoder or encoder
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Malformed header or value
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Band index out of range when writing
    #[error("Band {index} out of range (raster has {count})")]
    NoSuchBand { index: usize, count: usize },
}

impl From<RasterIoError> for CovariateError {
    fn from(err: RasterIoError) -> Self {
        match err {
            RasterIoError::IoError(e) => CovariateError::Io(e.to_string()),
            other => CovariateError::Format(other.to_string()),
        }
    }
}
