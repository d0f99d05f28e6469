//! Configuration for the covariate producers.

use std::path::PathBuf;
use std::time::Duration;

use covariate_common::{CovResult, CovariateError};

use crate::fetch::FetchConfig;
use crate::stac::DEFAULT_STAC_URL;

/// Default DEM service endpoint (OpenTopography GlobalDEM API).
pub const DEFAULT_ELEVATION_URL: &str = "https://portal.opentopography.org/API/globaldem";

/// Default root of the CHELSA V2.1 1981-2010 climatologies.
pub const DEFAULT_CLIMATE_URL: &str =
    "https://os.zhdk.cloud.switch.ch/envicloud/chelsa/chelsa_V2/GLOBAL/climatologies/1981-2010";

/// Settings shared by the producers.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    /// API key for the elevation service (`ELEVATION_API_KEY`).
    pub elevation_api_key: Option<String>,

    /// Elevation service endpoint.
    pub elevation_url: String,

    /// DEM product requested from the elevation service.
    pub dem_type: String,

    /// Buffer around the AOI, in degrees, when requesting a DEM.
    pub dem_buffer_deg: f64,

    /// Directory of the climate tile cache. Never evicted.
    pub cache_dir: PathBuf,

    /// Base URL for climate tiles.
    pub climate_url: String,

    /// STAC API root searched for optical scenes.
    pub stac_url: String,

    /// Scenes per sensor and date range in a reflectance composite.
    pub max_scenes: usize,

    /// Terrain analysis executable.
    pub terrain_tool: PathBuf,

    /// Parent of per-call scratch directories. `None` uses the system temp dir.
    pub scratch_dir: Option<PathBuf>,

    /// Retry and timeout settings for downloads.
    pub fetch: FetchConfig,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            elevation_api_key: None,
            elevation_url: DEFAULT_ELEVATION_URL.to_string(),
            dem_type: "SRTMGL1".to_string(),
            dem_buffer_deg: 0.01,
            cache_dir: PathBuf::from("./cache/climate"),
            climate_url: DEFAULT_CLIMATE_URL.to_string(),
            stac_url: DEFAULT_STAC_URL.to_string(),
            max_scenes: 3,
            terrain_tool: PathBuf::from("whitebox_tools"),
            scratch_dir: None,
            fetch: FetchConfig::default(),
        }
    }
}

impl CollaboratorConfig {
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

        config.elevation_api_key = lookup("ELEVATION_API_KEY").filter(|k| !k.trim().is_empty());

        if let Some(val) = lookup("ELEVATION_URL") {
            config.elevation_url = val;
        }
        if let Some(val) = lookup("ELEVATION_DEM_TYPE") {
            config.dem_type = val;
        }
        if let Some(val) = lookup("ELEVATION_BUFFER_DEG") {
            if let Ok(buffer) = val.parse() {
                config.dem_buffer_deg = buffer;
            }
        }
        if let Some(val) = lookup("COVARIATE_CACHE_DIR") {
            config.cache_dir = PathBuf::from(val);
        }
        if let Some(val) = lookup("CLIMATE_URL") {
            config.climate_url = val;
        }
        if let Some(val) = lookup("STAC_URL") {
            config.stac_url = val;
        }
        if let Some(val) = lookup("STAC_MAX_SCENES") {
            if let Ok(n) = val.parse() {
                config.max_scenes = n;
            }
        }
        if let Some(val) = lookup("TERRAIN_TOOL") {
            config.terrain_tool = PathBuf::from(val);
        }
        if let Some(val) = lookup("COVARIATE_SCRATCH_DIR") {
            config.scratch_dir = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("FETCH_MAX_RETRIES") {
            if let Ok(n) = val.parse() {
                config.fetch.max_retries = n;
            }
        }
        if let Some(val) = lookup("FETCH_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.fetch.request_timeout = Duration::from_secs(secs);
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CovResult<()> {
        if !(self.dem_buffer_deg >= 0.0 && self.dem_buffer_deg < 5.0) {
            return Err(CovariateError::InvalidArgument(format!(
                "dem_buffer_deg must be in [0, 5), got {}",
                self.dem_buffer_deg
            )));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(CovariateError::InvalidArgument(
                "cache_dir must not be empty".to_string(),
            ));
        }
        if self.max_scenes == 0 {
            return Err(CovariateError::InvalidArgument(
                "max_scenes must be at least 1".to_string(),
            ));
        }
        if self.terrain_tool.as_os_str().is_empty() {
            return Err(CovariateError::InvalidArgument(
                "terrain_tool must not be empty".to_string(),
            ));
        }
        self.fetch.validate()
    }
}
