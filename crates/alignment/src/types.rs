//! Option and result types for covariate alignment.

use std::fmt;
use std::str::FromStr;

use covariate_common::{Band, CovariateError, Raster};
use serde::{Deserialize, Serialize};

/// Resampling kernel used for reprojection and for the final pass onto the
/// reference grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    /// Value of the containing source cell. Safe for categorical layers.
    #[default]
    Nearest,
    /// Bilinear interpolation between the four nearest cell centers.
    Bilinear,
    /// Catmull-Rom bicubic interpolation.
    Cubic,
}

impl ResampleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "near",
            Self::Bilinear => "bilinear",
            Self::Cubic => "cubic",
        }
    }
}

impl FromStr for ResampleMethod {
    type Err = CovariateError;

    /// Parse from string (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "near" | "nearest" | "ngb" => Ok(Self::Nearest),
            "bilinear" | "linear" => Ok(Self::Bilinear),
            "cubic" | "bicubic" => Ok(Self::Cubic),
            other => Err(CovariateError::InvalidArgument(format!(
                "unknown resampling method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-call alignment options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignOptions {
    /// Kernel for reprojection and resampling.
    pub method: ResampleMethod,
    /// Crop each layer to the reference extent before resampling.
    pub crop: bool,
    /// Drop bands whose standard deviation is zero or undefined.
    pub remove_constant: bool,
    /// Log progress and removal summaries at info rather than debug.
    pub verbose: bool,
}

impl Default for AlignOptions {
    fn default() -> Self {
        Self {
            method: ResampleMethod::Nearest,
            crop: true,
            remove_constant: true,
            verbose: true,
        }
    }
}

/// Multi-band raster on the reference grid with unique band names.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedStack {
    raster: Raster,
}

impl AlignedStack {
    pub(crate) fn new(raster: Raster) -> Self {
        Self { raster }
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    /// Band names in stack order.
    pub fn names(&self) -> Vec<&str> {
        self.raster.band_names()
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.raster.band(name)
    }

    pub fn len(&self) -> usize {
        self.raster.band_count()
    }

    pub fn is_empty(&self) -> bool {
        self.raster.bands.is_empty()
    }

    pub fn into_raster(self) -> Raster {
        self.raster
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_method_parse() {
        assert_eq!("near".parse::<ResampleMethod>().unwrap(), ResampleMethod::Nearest);
        assert_eq!("NEAREST".parse::<ResampleMethod>().unwrap(), ResampleMethod::Nearest);
        assert_eq!("bilinear".parse::<ResampleMethod>().unwrap(), ResampleMethod::Bilinear);
        assert_eq!("bicubic".parse::<ResampleMethod>().unwrap(), ResampleMethod::Cubic);
        assert!(matches!(
            "lanczos".parse::<ResampleMethod>(),
            Err(CovariateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for m in [ResampleMethod::Nearest, ResampleMethod::Bilinear, ResampleMethod::Cubic] {
            assert_eq!(m.to_string().parse::<ResampleMethod>().unwrap(), m);
        }
    }

    #[test]
    fn test_default_options() {
        let opts = AlignOptions::default();
        assert_eq!(opts.method, ResampleMethod::Nearest);
        assert!(opts.crop);
        assert!(opts.remove_constant);
        assert!(opts.verbose);
    }
}
