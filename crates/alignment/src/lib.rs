//! Covariate alignment engine.
//!
//! Takes a reference grid (a raster in a projected CRS) and any number of
//! covariate rasters in arbitrary CRS, extent and resolution, and returns a
//! single multi-band stack on the reference grid.
//!
//! # Example
//!
//! ```ignore
//! use alignment::{align_covariates, AlignOptions};
//!
//! let stack = align_covariates(&dem, vec![slope.into(), climate.into()], &AlignOptions::default())?;
//! assert_eq!(stack.raster().grid, dem.grid);
//! ```

pub mod config;
pub mod engine;
pub mod flatten;
pub mod names;
pub mod stack;
pub mod types;
pub mod validate;
pub mod warp;

pub use config::AlignConfig;
pub use engine::{align_covariates, align_layer, Aligner};
pub use flatten::{flatten_inputs, Flattened};
pub use names::make_unique;
pub use stack::{remove_constant_bands, stack_layers, BandStats};
pub use types::{AlignOptions, AlignedStack, ResampleMethod};
pub use validate::{reference_raster, validate_reference_grid};
pub use warp::{crop_raster, reproject_raster, resample_raster, warp_to_grid, SampleMap};
