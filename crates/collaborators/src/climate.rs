//! Bioclimatic and monthly-mean climate layers from the CHELSA V2.1
//! 1981-2010 climatologies.
//!
//! Each variable is one global GeoTIFF under the climatology root:
//!
//! ```text
//! bio/CHELSA_bio1_1981-2010_V.2.1.tif
//! tas/CHELSA_tas_01_1981-2010_V.2.1.tif
//! pr/CHELSA_pr_12_1981-2010_V.2.1.tif
//! ```
//!
//! Values are returned as stored in the tiles.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use alignment::crop_raster;
use covariate_common::{
    AreaOfInterest, BoundingBox, CovResult, CovariateError, CrsCode, Raster, RasterOrOther,
};
use futures::future::try_join_all;
use projection::transform_bbox;
use tracing::{debug, info, instrument, warn};

use crate::cache::ContentCache;
use crate::config::CollaboratorConfig;
use crate::fetch::Fetcher;

/// Climatology period and product version in the tile names.
const PERIOD: &str = "1981-2010";
const VERSION: &str = "V.2.1";

/// Climate variables in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClimateVariable {
    /// Bioclimatic variable 1..=19.
    Bio(u8),
    /// Mean near-surface air temperature of a month (1..=12).
    Tas(u8),
    /// Precipitation of a month (1..=12).
    Pr(u8),
}

impl ClimateVariable {
    /// Every supported variable: `bio01`..`bio19`, then `tas_01`..`tas_12`
    /// and `pr_01`..`pr_12`.
    pub fn catalog() -> Vec<ClimateVariable> {
        (1..=19)
            .map(ClimateVariable::Bio)
            .chain((1..=12).map(ClimateVariable::Tas))
            .chain((1..=12).map(ClimateVariable::Pr))
            .collect()
    }

    /// Layer name.
    pub fn name(&self) -> String {
        match self {
            ClimateVariable::Bio(n) => format!("bio{:02}", n),
            ClimateVariable::Tas(m) => format!("tas_{:02}", m),
            ClimateVariable::Pr(m) => format!("pr_{:02}", m),
        }
    }

    /// Path of the variable's tile below the climatology root.
    pub fn tile_path(&self) -> String {
        match self {
            ClimateVariable::Bio(n) => format!("bio/CHELSA_bio{}_{}_{}.tif", n, PERIOD, VERSION),
            ClimateVariable::Tas(m) => format!("tas/CHELSA_tas_{:02}_{}_{}.tif", m, PERIOD, VERSION),
            ClimateVariable::Pr(m) => format!("pr/CHELSA_pr_{:02}_{}_{}.tif", m, PERIOD, VERSION),
        }
    }
}

fn index_suffix(rest: &str, max: u8) -> Option<u8> {
    rest.trim_start_matches('_')
        .parse::<u8>()
        .ok()
        .filter(|n| (1..=max).contains(n))
}

impl FromStr for ClimateVariable {
    type Err = CovariateError;

    /// Accepts `bio1`, `bio01`, `bio_1`, `BIO01`, and `tas_07`, `tas7`,
    /// `pr12` style monthly names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let parsed = if let Some(rest) = lower.strip_prefix("bio") {
            index_suffix(rest, 19).map(ClimateVariable::Bio)
        } else if let Some(rest) = lower.strip_prefix("tas") {
            index_suffix(rest, 12).map(ClimateVariable::Tas)
        } else if let Some(rest) = lower.strip_prefix("pr") {
            index_suffix(rest, 12).map(ClimateVariable::Pr)
        } else {
            None
        };
        parsed.ok_or_else(|| CovariateError::UnknownTool(format!("unsupported climate variable '{}'", s)))
    }
}

impl fmt::Display for ClimateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Downloads, caches and crops climate tiles.
pub struct ClimateRetriever {
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn ContentCache>,
    base_url: String,
    tile_crs: CrsCode,
}

impl ClimateRetriever {
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: Arc<dyn ContentCache>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            cache,
            base_url: base_url.into(),
            tile_crs: CrsCode::Epsg4326,
        }
    }

    pub fn from_config(
        config: &CollaboratorConfig,
        fetcher: Arc<dyn Fetcher>,
        cache: Arc<dyn ContentCache>,
    ) -> Self {
        Self::new(fetcher, cache, &config.climate_url)
    }

    /// Tile URL of a variable.
    pub fn tile_url(&self, variable: ClimateVariable) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), variable.tile_path())
    }

    /// Cache key of a variable's tile: the remote file name.
    pub fn filename(&self, variable: ClimateVariable) -> String {
        let path = variable.tile_path();
        match path.rsplit_once('/') {
            Some((_, name)) => name.to_string(),
            None => path,
        }
    }

    /// Climate layers over `aoi`, named after the variables.
    ///
    /// Tiles already in the cache are reused unless `overwrite` is set. Each
    /// tile is cropped in its own CRS to the AOI (plus the reference grid's
    /// footprint, when known) with a one-cell margin.
    #[instrument(skip(self, grid, aoi, variables))]
    pub async fn climate_layers<S: AsRef<str>>(
        &self,
        grid: &Raster,
        aoi: &AreaOfInterest,
        variables: &[S],
        overwrite: bool,
    ) -> CovResult<RasterOrOther> {
        let variables = variables
            .iter()
            .map(|v| v.as_ref().parse())
            .collect::<CovResult<Vec<ClimateVariable>>>()?;
        if variables.is_empty() {
            return Err(CovariateError::InvalidArgument(
                "no climate variables requested".to_string(),
            ));
        }

        let extent = self.tile_extent(grid, aoi)?;
        debug!(extent = ?extent, variables = variables.len(), "Retrieving climate tiles");

        let layers = try_join_all(
            variables
                .iter()
                .map(|v| self.variable_layer(*v, &extent, overwrite)),
        )
        .await?;

        info!(layers = layers.len(), "Climate layers ready");
        Ok(RasterOrOther::Collection(
            layers.into_iter().map(RasterOrOther::from).collect(),
        ))
    }

    /// AOI extent in the tile CRS, grown to include the reference grid.
    fn tile_extent(&self, grid: &Raster, aoi: &AreaOfInterest) -> CovResult<BoundingBox> {
        let aoi_crs = aoi
            .crs
            .ok_or_else(|| CovariateError::UndefinedCrs("area of interest".to_string()))?;
        let aoi_bbox = aoi
            .bbox()
            .ok_or_else(|| CovariateError::InvalidGeometry("area of interest has no vertices".to_string()))?;

        let mut extent = if aoi_crs.same_space(&self.tile_crs) {
            aoi_bbox
        } else {
            warn!(
                aoi_crs = %aoi_crs,
                tile_crs = %self.tile_crs,
                "Area of interest CRS differs from climate tiles; transforming it to the tile CRS"
            );
            transform_bbox(aoi_crs, self.tile_crs, &aoi_bbox)?
        };

        if let Some(grid_crs) = grid.crs {
            let footprint = transform_bbox(grid_crs, self.tile_crs, &grid.grid.bbox())?;
            extent = BoundingBox::new(
                extent.min_x.min(footprint.min_x),
                extent.min_y.min(footprint.min_y),
                extent.max_x.max(footprint.max_x),
                extent.max_y.max(footprint.max_y),
            );
        }
        Ok(extent)
    }

    async fn variable_layer(
        &self,
        variable: ClimateVariable,
        extent: &BoundingBox,
        overwrite: bool,
    ) -> CovResult<Raster> {
        let key = self.filename(variable);

        let cached = if overwrite { None } else { self.cache.get(&key).await };
        let path = match cached {
            Some(path) => {
                debug!(key = %key, "Climate tile already cached, skipping download");
                path
            }
            None => {
                let body = self.fetcher.fetch(&self.tile_url(variable)).await?;
                self.cache.put(&key, body).await?
            }
        };

        let tile = raster_io::read(&path)?;
        let tile = Raster {
            crs: tile.crs.or(Some(self.tile_crs)),
            ..tile
        };

        let margin = tile.grid.dx.max(tile.grid.dy);
        let cropped = crop_raster(&tile, &extent.expand(margin)).ok_or_else(|| {
            CovariateError::InvalidGeometry(format!(
                "area of interest lies outside the {} tile",
                variable
            ))
        })?;

        Ok(cropped.with_name(variable.name()))
    }
}
