//! Raster file I/O for covariate layers.
//!
//! Layers are exchanged with the terrain tool, the DEM and climate services
//! and the command-line stacker as single-band GeoTIFFs. Grid geometry, CRS
//! and nodata travel in the GeoTIFF tags.

pub mod error;
pub mod geotiff;

pub use error::{RasterIoError, RasterIoResult};
pub use geotiff::{decode, encode, is_geotiff, read, write_band, write_stack, GeoInfo};
