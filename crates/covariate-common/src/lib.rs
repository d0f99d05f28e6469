//! Common types shared across the covariate stack crates.

pub mod aoi;
pub mod bbox;
pub mod crs;
pub mod error;
pub mod grid;
pub mod raster;

pub use aoi::{AreaOfInterest, Geometry, Ring};
pub use bbox::BoundingBox;
pub use crs::CrsCode;
pub use error::{CovResult, CovariateError};
pub use grid::{GridSpec, GRID_TOLERANCE};
pub use raster::{Band, Raster, RasterOrOther};
