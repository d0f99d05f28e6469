//! Spectral indices from optical satellite reflectance.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use covariate_common::{
    AreaOfInterest, Band, CovResult, CovariateError, CrsCode, GridSpec, Raster, RasterOrOther,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Supported optical sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    Sentinel2,
    Landsat8,
}

impl Sensor {
    /// Prefix used in layer names.
    pub fn prefix(&self) -> &'static str {
        match self {
            Sensor::Sentinel2 => "S2",
            Sensor::Landsat8 => "L8",
        }
    }

    /// Product band identifier of a reflectance band.
    pub fn band_id(&self, band: SpectralBand) -> &'static str {
        match (self, band) {
            (Sensor::Sentinel2, SpectralBand::Blue) => "B02",
            (Sensor::Sentinel2, SpectralBand::Green) => "B03",
            (Sensor::Sentinel2, SpectralBand::Red) => "B04",
            (Sensor::Sentinel2, SpectralBand::Nir) => "B08",
            (Sensor::Sentinel2, SpectralBand::Swir1) => "B11",
            (Sensor::Sentinel2, SpectralBand::Swir2) => "B12",
            (Sensor::Landsat8, SpectralBand::Blue) => "SR_B2",
            (Sensor::Landsat8, SpectralBand::Green) => "SR_B3",
            (Sensor::Landsat8, SpectralBand::Red) => "SR_B4",
            (Sensor::Landsat8, SpectralBand::Nir) => "SR_B5",
            (Sensor::Landsat8, SpectralBand::Swir1) => "SR_B6",
            (Sensor::Landsat8, SpectralBand::Swir2) => "SR_B7",
        }
    }
}

impl FromStr for Sensor {
    type Err = CovariateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "s2" | "sentinel2" => Ok(Sensor::Sentinel2),
            "l8" | "landsat8" => Ok(Sensor::Landsat8),
            other => Err(CovariateError::InvalidArgument(format!("unknown sensor '{}'", other))),
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Reflectance bands used by the indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpectralBand {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
    Swir2,
}

impl SpectralBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpectralBand::Blue => "blue",
            SpectralBand::Green => "green",
            SpectralBand::Red => "red",
            SpectralBand::Nir => "nir",
            SpectralBand::Swir1 => "swir1",
            SpectralBand::Swir2 => "swir2",
        }
    }
}

/// Thematic grouping of indices, used for exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexDomain {
    Vegetation,
    Water,
    Burn,
    Urban,
    Soil,
}

impl FromStr for IndexDomain {
    type Err = CovariateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vegetation" => Ok(IndexDomain::Vegetation),
            "water" => Ok(IndexDomain::Water),
            "burn" => Ok(IndexDomain::Burn),
            "urban" => Ok(IndexDomain::Urban),
            "soil" => Ok(IndexDomain::Soil),
            other => Err(CovariateError::InvalidArgument(format!("unknown index domain '{}'", other))),
        }
    }
}

/// Spectral indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectralIndex {
    Ndvi,
    Evi,
    Savi,
    Ndwi,
    Mndwi,
    Nbr,
    Ndbi,
    Bsi,
}

impl SpectralIndex {
    pub const ALL: [SpectralIndex; 8] = [
        SpectralIndex::Ndvi,
        SpectralIndex::Evi,
        SpectralIndex::Savi,
        SpectralIndex::Ndwi,
        SpectralIndex::Mndwi,
        SpectralIndex::Nbr,
        SpectralIndex::Ndbi,
        SpectralIndex::Bsi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "ndvi",
            SpectralIndex::Evi => "evi",
            SpectralIndex::Savi => "savi",
            SpectralIndex::Ndwi => "ndwi",
            SpectralIndex::Mndwi => "mndwi",
            SpectralIndex::Nbr => "nbr",
            SpectralIndex::Ndbi => "ndbi",
            SpectralIndex::Bsi => "bsi",
        }
    }

    pub fn domain(&self) -> IndexDomain {
        match self {
            SpectralIndex::Ndvi | SpectralIndex::Evi | SpectralIndex::Savi => IndexDomain::Vegetation,
            SpectralIndex::Ndwi | SpectralIndex::Mndwi => IndexDomain::Water,
            SpectralIndex::Nbr => IndexDomain::Burn,
            SpectralIndex::Ndbi => IndexDomain::Urban,
            SpectralIndex::Bsi => IndexDomain::Soil,
        }
    }

    pub fn required_bands(&self) -> &'static [SpectralBand] {
        use SpectralBand::*;
        match self {
            SpectralIndex::Ndvi | SpectralIndex::Savi => &[Red, Nir],
            SpectralIndex::Evi => &[Blue, Red, Nir],
            SpectralIndex::Ndwi => &[Green, Nir],
            SpectralIndex::Mndwi => &[Green, Swir1],
            SpectralIndex::Nbr => &[Nir, Swir2],
            SpectralIndex::Ndbi => &[Nir, Swir1],
            SpectralIndex::Bsi => &[Blue, Red, Nir, Swir1],
        }
    }

    /// Index value for one pixel. `NaN` when the denominator vanishes or an
    /// input is missing.
    pub fn compute(&self, px: &Pixel) -> f32 {
        let ratio = |num: f32, den: f32| if den == 0.0 { f32::NAN } else { num / den };
        match self {
            SpectralIndex::Ndvi => ratio(px.nir - px.red, px.nir + px.red),
            SpectralIndex::Evi => ratio(
                2.5 * (px.nir - px.red),
                px.nir + 6.0 * px.red - 7.5 * px.blue + 1.0,
            ),
            SpectralIndex::Savi => ratio(1.5 * (px.nir - px.red), px.nir + px.red + 0.5),
            SpectralIndex::Ndwi => ratio(px.green - px.nir, px.green + px.nir),
            SpectralIndex::Mndwi => ratio(px.green - px.swir1, px.green + px.swir1),
            SpectralIndex::Nbr => ratio(px.nir - px.swir2, px.nir + px.swir2),
            SpectralIndex::Ndbi => ratio(px.swir1 - px.nir, px.swir1 + px.nir),
            SpectralIndex::Bsi => ratio(
                (px.swir1 + px.red) - (px.nir + px.blue),
                (px.swir1 + px.red) + (px.nir + px.blue),
            ),
        }
    }
}

/// Surface reflectance of one pixel. Unrequested bands are `NaN`.
#[derive(Debug, Clone, Copy)]
pub struct Pixel {
    pub blue: f32,
    pub green: f32,
    pub red: f32,
    pub nir: f32,
    pub swir1: f32,
    pub swir2: f32,
}

/// Inclusive acquisition window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> CovResult<Self> {
        if end < start {
            return Err(CovariateError::InvalidArgument(format!(
                "date range ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Compact label used in layer names, e.g. `20230101_20230630`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.start.format("%Y%m%d"), self.end.format("%Y%m%d"))
    }
}

impl FromStr for DateRange {
    type Err = CovariateError;

    /// Parse `YYYY-MM-DD/YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('/')
            .ok_or_else(|| CovariateError::InvalidArgument(format!("bad date range '{}'", s)))?;
        let parse = |d: &str| {
            NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                .map_err(|e| CovariateError::InvalidArgument(format!("bad date '{}': {}", d, e)))
        };
        Self::new(parse(a)?, parse(b)?)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start, self.end)
    }
}

/// What a scene source is asked for.
#[derive(Debug, Clone)]
pub struct SceneRequest<'a> {
    pub sensor: Sensor,
    pub aoi: &'a AreaOfInterest,
    /// Grid the composite should be delivered on.
    pub grid: &'a GridSpec,
    /// CRS of `grid`.
    pub crs: CrsCode,
    pub range: DateRange,
    pub bands: Vec<SpectralBand>,
}

/// Provider of cloud-free reflectance composites.
#[async_trait]
pub trait SceneSource: Send + Sync {
    /// Composite over the request window with one band per requested
    /// `SpectralBand`, named by [`SpectralBand::as_str`].
    async fn reflectance(&self, request: &SceneRequest<'_>) -> CovResult<Raster>;
}

/// Computes spectral index layers.
pub struct IndexCalculator {
    source: Arc<dyn SceneSource>,
}

impl IndexCalculator {
    pub fn new(source: Arc<dyn SceneSource>) -> Self {
        Self { source }
    }

    /// Index layers for every sensor and date range.
    ///
    /// Layers are named `<sensor>_<index>`, with `_<start>_<end>` appended
    /// when more than one range is requested. Indices of an excluded domain
    /// are skipped. Each composite's layers come back as a collection
    /// together with a label describing the scene.
    #[instrument(skip(self, aoi, grid))]
    pub async fn index_layers(
        &self,
        aoi: &AreaOfInterest,
        grid: &Raster,
        sensors: &[Sensor],
        date_ranges: &[DateRange],
        exclude: &[IndexDomain],
    ) -> CovResult<RasterOrOther> {
        if sensors.is_empty() {
            return Err(CovariateError::InvalidArgument("no sensors requested".to_string()));
        }
        if date_ranges.is_empty() {
            return Err(CovariateError::InvalidArgument("no date ranges requested".to_string()));
        }
        let crs = grid
            .crs
            .ok_or_else(|| CovariateError::UndefinedCrs(grid.name().to_string()))?;

        let indices: Vec<SpectralIndex> = SpectralIndex::ALL
            .iter()
            .copied()
            .filter(|i| !exclude.contains(&i.domain()))
            .collect();
        if indices.is_empty() {
            warn!(excluded = ?exclude, "Every index domain excluded");
            return Ok(RasterOrOther::Collection(Vec::new()));
        }

        let bands: Vec<SpectralBand> = indices
            .iter()
            .flat_map(|i| i.required_bands().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut bundles = Vec::with_capacity(sensors.len() * date_ranges.len());
        for &sensor in sensors {
            for range in date_ranges {
                let request = SceneRequest {
                    sensor,
                    aoi,
                    grid: &grid.grid,
                    crs,
                    range: *range,
                    bands: bands.clone(),
                };
                let scene = self.source.reflectance(&request).await?;
                let suffix = (date_ranges.len() > 1).then(|| range.label());
                let layer = compute_indices(&scene, sensor, &indices, suffix.as_deref())?;
                debug!(sensor = %sensor, range = %range, bands = layer.bands.len(), "Computed indices");

                bundles.push(RasterOrOther::Collection(vec![
                    layer.into(),
                    RasterOrOther::other(format!("{} composite {}", sensor, range)),
                ]));
            }
        }

        info!(
            sensors = sensors.len(),
            ranges = date_ranges.len(),
            indices = indices.len(),
            "Spectral index layers ready"
        );
        Ok(RasterOrOther::Collection(bundles))
    }
}

fn band_data(scene: &Raster, band: SpectralBand) -> Option<&[f32]> {
    scene.band(band.as_str()).map(|b| b.data.as_slice())
}

/// Compute `indices` over a reflectance composite.
pub fn compute_indices(
    scene: &Raster,
    sensor: Sensor,
    indices: &[SpectralIndex],
    suffix: Option<&str>,
) -> CovResult<Raster> {
    for index in indices {
        for band in index.required_bands() {
            if band_data(scene, *band).is_none() {
                return Err(CovariateError::Format(format!(
                    "{} composite lacks the {} band ({}) needed for {}",
                    sensor,
                    band.as_str(),
                    sensor.band_id(*band),
                    index.as_str()
                )));
            }
        }
    }

    let blue = band_data(scene, SpectralBand::Blue);
    let green = band_data(scene, SpectralBand::Green);
    let red = band_data(scene, SpectralBand::Red);
    let nir = band_data(scene, SpectralBand::Nir);
    let swir1 = band_data(scene, SpectralBand::Swir1);
    let swir2 = band_data(scene, SpectralBand::Swir2);
    let at = |d: Option<&[f32]>, i: usize| d.map_or(f32::NAN, |d| d[i]);

    let pixels: Vec<Pixel> = (0..scene.grid.len())
        .map(|i| Pixel {
            blue: at(blue, i),
            green: at(green, i),
            red: at(red, i),
            nir: at(nir, i),
            swir1: at(swir1, i),
            swir2: at(swir2, i),
        })
        .collect();

    let bands = indices
        .iter()
        .map(|index| {
            let name = match suffix {
                Some(s) => format!("{}_{}_{}", sensor.prefix(), index.as_str(), s),
                None => format!("{}_{}", sensor.prefix(), index.as_str()),
            };
            Band::new(name, pixels.iter().map(|px| index.compute(px)).collect())
        })
        .collect();

    Ok(Raster {
        grid: scene.grid,
        crs: scene.crs,
        bands,
    })
}
