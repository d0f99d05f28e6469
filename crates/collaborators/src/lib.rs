//! Covariate producers that feed the alignment engine.
//!
//! Each producer turns an area of interest (or a reference grid) into one or
//! more rasters: a DEM-derived reference grid, terrain derivatives from an
//! external tool, spectral indices, oblique coordinates and climate tiles.
//! Network access goes through [`Fetcher`] and downloaded tiles through
//! [`ContentCache`], so every producer can be tested offline.

pub mod cache;
pub mod climate;
pub mod config;
pub mod elevation;
pub mod fetch;
pub mod geometry;
pub mod oblique;
pub mod remote_sensing;
pub mod stac;
pub mod terrain;

pub use cache::{CacheStats, ContentCache, FsCache, MemoryCache};
pub use climate::{ClimateRetriever, ClimateVariable};
pub use config::CollaboratorConfig;
pub use elevation::{ClipMode, DemSource, ElevationRetriever, HttpDemSource, ELEVATION_BAND};
pub use fetch::{FetchConfig, Fetcher, HttpFetcher};
pub use geometry::{mask_outside, project_geometry};
pub use oblique::{oblique_layers, MIN_DIRECTIONS};
pub use remote_sensing::{
    compute_indices, DateRange, IndexCalculator, IndexDomain, Sensor, SceneRequest, SceneSource,
    SpectralBand, SpectralIndex,
};
pub use stac::{median_composite, StacSceneSource, DEFAULT_STAC_URL};
pub use terrain::{ProcessRunner, TerrainAnalyzer, ToolGroup, ToolRunner};
