//! Configuration for the alignment engine.

use covariate_common::{CovResult, CovariateError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{AlignOptions, ResampleMethod};

/// Engine configuration: default per-call options plus the worker budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Options applied when the caller does not pass its own.
    pub options: AlignOptions,

    /// Upper bound on worker threads. `None` uses the global rayon pool.
    pub max_threads: Option<usize>,
}

impl AlignConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("COVARIATE_RESAMPLE") {
            match val.parse::<ResampleMethod>() {
                Ok(method) => config.options.method = method,
                Err(e) => warn!(error = %e, "Ignoring COVARIATE_RESAMPLE"),
            }
        }

        if let Some(val) = lookup("COVARIATE_CROP") {
            config.options.crop = parse_flag(&val);
        }

        if let Some(val) = lookup("COVARIATE_REMOVE_CONSTANT") {
            config.options.remove_constant = parse_flag(&val);
        }

        if let Some(val) = lookup("COVARIATE_VERBOSE") {
            config.options.verbose = parse_flag(&val);
        }

        if let Some(val) = lookup("COVARIATE_MAX_THREADS") {
            if let Ok(n) = val.parse() {
                config.max_threads = Some(n);
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CovResult<()> {
        if self.max_threads == Some(0) {
            return Err(CovariateError::InvalidArgument(
                "max_threads must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
