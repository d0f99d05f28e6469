//! Reflectance composites from a STAC API (Earth Search by default).
//!
//! Scenes are found with an item search over the AOI and date range, the
//! least cloudy ones are kept, every requested band is decoded from its
//! GeoTIFF asset, scaled to surface reflectance and sampled onto the
//! request grid. The composite is the per-cell median over scenes.

use std::collections::HashMap;
use std::sync::Arc;

use alignment::{warp_to_grid, ResampleMethod};
use async_trait::async_trait;
use covariate_common::{Band, CovResult, CovariateError, CrsCode, GridSpec, Raster};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::CollaboratorConfig;
use crate::fetch::Fetcher;
use crate::geometry::project_geometry;
use crate::remote_sensing::{SceneRequest, SceneSource, Sensor, SpectralBand};

/// Default STAC API root.
pub const DEFAULT_STAC_URL: &str = "https://earth-search.aws.element84.com/v1";

/// Items requested per search.
const SEARCH_LIMIT: usize = 100;

impl Sensor {
    /// STAC collection holding the sensor's surface reflectance.
    pub fn collection(&self) -> &'static str {
        match self {
            Sensor::Sentinel2 => "sentinel-2-l2a",
            Sensor::Landsat8 => "landsat-c2-l2",
        }
    }

    /// STAC asset key of a reflectance band.
    pub fn asset_key(&self, band: SpectralBand) -> &'static str {
        match (self, band) {
            (_, SpectralBand::Blue) => "blue",
            (_, SpectralBand::Green) => "green",
            (_, SpectralBand::Red) => "red",
            (Sensor::Sentinel2, SpectralBand::Nir) => "nir",
            (Sensor::Landsat8, SpectralBand::Nir) => "nir08",
            (_, SpectralBand::Swir1) => "swir16",
            (_, SpectralBand::Swir2) => "swir22",
        }
    }

    /// Scale and offset from stored values to reflectance when the asset
    /// does not carry them.
    fn default_scaling(&self) -> (f64, f64) {
        match self {
            Sensor::Sentinel2 => (1e-4, 0.0),
            Sensor::Landsat8 => (2.75e-5, -0.2),
        }
    }

    /// Platform names accepted from a collection shared by several sensors.
    fn platforms(&self) -> &'static [&'static str] {
        match self {
            Sensor::Sentinel2 => &[],
            Sensor::Landsat8 => &["landsat-8"],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ItemCollection {
    #[serde(default)]
    pub features: Vec<Item>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub properties: ItemProperties,
    #[serde(default)]
    pub assets: HashMap<String, Asset>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemProperties {
    #[serde(rename = "eo:cloud_cover")]
    pub cloud_cover: Option<f64>,
    #[serde(rename = "proj:epsg")]
    pub epsg: Option<u32>,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "raster:bands", default)]
    pub raster_bands: Vec<RasterBandInfo>,
}

/// Subset of the STAC raster extension.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RasterBandInfo {
    pub nodata: Option<f64>,
    pub scale: Option<f64>,
    pub offset: Option<f64>,
}

impl Item {
    fn cloud_cover(&self) -> f64 {
        self.properties.cloud_cover.unwrap_or(100.0)
    }
}

/// Scene source backed by a STAC item search.
pub struct StacSceneSource {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
    max_scenes: usize,
}

impl StacSceneSource {
    pub fn new(fetcher: Arc<dyn Fetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            max_scenes: 3,
        }
    }

    pub fn from_config(config: &CollaboratorConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new(fetcher, &config.stac_url).with_max_scenes(config.max_scenes)
    }

    pub fn with_max_scenes(mut self, max_scenes: usize) -> Self {
        self.max_scenes = max_scenes.max(1);
        self
    }

    /// Item search URL for a request.
    pub fn search_url(&self, request: &SceneRequest<'_>) -> CovResult<String> {
        let aoi_crs = request
            .aoi
            .crs
            .ok_or_else(|| CovariateError::UndefinedCrs("area of interest".to_string()))?;
        let lonlat = project_geometry(&request.aoi.geometry, aoi_crs, CrsCode::Epsg4326)?;
        let bbox = lonlat
            .bbox()
            .ok_or_else(|| CovariateError::InvalidGeometry("area of interest has no vertices".to_string()))?;

        Ok(format!(
            "{}/search?collections={}&bbox={},{},{},{}&datetime={}T00:00:00Z/{}T23:59:59Z&limit={}",
            self.base_url.trim_end_matches('/'),
            request.sensor.collection(),
            bbox.min_x,
            bbox.min_y,
            bbox.max_x,
            bbox.max_y,
            request.range.start,
            request.range.end,
            SEARCH_LIMIT
        ))
    }

    /// Least cloudy items of the sensor, best first.
    async fn search(&self, request: &SceneRequest<'_>) -> CovResult<Vec<Item>> {
        let url = self.search_url(request)?;
        let body = self.fetcher.fetch(&url).await?;
        let found: ItemCollection = serde_json::from_slice(&body)
            .map_err(|e| CovariateError::Format(format!("invalid STAC search response: {}", e)))?;

        let platforms = request.sensor.platforms();
        let mut items: Vec<Item> = found
            .features
            .into_iter()
            .filter(|item| {
                platforms.is_empty()
                    || item
                        .properties
                        .platform
                        .as_deref()
                        .map_or(false, |p| platforms.contains(&p))
            })
            .collect();
        items.sort_by(|a, b| a.cloud_cover().total_cmp(&b.cloud_cover()));
        items.truncate(self.max_scenes);
        Ok(items)
    }

    /// One band of one scene, as reflectance on the request grid.
    async fn scene_band(
        &self,
        item: &Item,
        sensor: Sensor,
        band: SpectralBand,
        grid: &GridSpec,
        crs: CrsCode,
    ) -> CovResult<Vec<f32>> {
        let key = sensor.asset_key(band);
        let asset = item.assets.get(key).ok_or_else(|| {
            CovariateError::Format(format!("scene {} has no '{}' asset", item.id, key))
        })?;
        let body = self.fetcher.fetch(&http_href(&asset.href)?).await?;

        let info = asset.raster_bands.first().cloned().unwrap_or_default();
        let (default_scale, default_offset) = sensor.default_scaling();
        let scale = info.scale.unwrap_or(default_scale) as f32;
        let offset = info.offset.unwrap_or(default_offset) as f32;
        let nodata = info.nodata.map(|v| v as f32);
        let fallback_crs = item
            .properties
            .epsg
            .and_then(|code| CrsCode::parse(&format!("EPSG:{}", code)).ok());
        let grid = *grid;
        let name = band.as_str();

        let sampled = tokio::task::spawn_blocking(move || -> CovResult<Raster> {
            let mut scene = raster_io::decode(&body, name)?;
            if scene.crs.is_none() {
                scene.crs = fallback_crs;
            }
            for v in scene.bands[0].data.iter_mut() {
                *v = if nodata == Some(*v) { f32::NAN } else { *v * scale + offset };
            }
            warp_to_grid(&scene, &grid, crs, ResampleMethod::Bilinear)
        })
        .await
        .map_err(|e| CovariateError::Io(format!("scene decoding task failed: {}", e)))??;

        Ok(sampled.bands.into_iter().next().map(|b| b.data).unwrap_or_default())
    }
}

/// Assets hosted in S3 buckets are read through their public HTTPS endpoint.
fn http_href(href: &str) -> CovResult<String> {
    if href.starts_with("https://") || href.starts_with("http://") {
        return Ok(href.to_string());
    }
    if let Some(rest) = href.strip_prefix("s3://") {
        if let Some((bucket, key)) = rest.split_once('/') {
            return Ok(format!("https://{}.s3.amazonaws.com/{}", bucket, key));
        }
    }
    Err(CovariateError::Download(format!("unsupported asset location '{}'", href)))
}

/// Per-cell median of the finite values across scenes; `NaN` where no
/// scene has data.
pub fn median_composite(scenes: &[Vec<f32>], len: usize) -> Vec<f32> {
    let mut values = Vec::with_capacity(scenes.len());
    (0..len)
        .map(|i| {
            values.clear();
            values.extend(scenes.iter().filter_map(|s| s.get(i).copied()).filter(|v| v.is_finite()));
            if values.is_empty() {
                return f32::NAN;
            }
            values.sort_by(|a, b| a.total_cmp(b));
            let mid = values.len() / 2;
            if values.len() % 2 == 0 {
                (values[mid - 1] + values[mid]) / 2.0
            } else {
                values[mid]
            }
        })
        .collect()
}

#[async_trait]
impl SceneSource for StacSceneSource {
    #[instrument(skip(self, request), fields(sensor = %request.sensor, range = %request.range))]
    async fn reflectance(&self, request: &SceneRequest<'_>) -> CovResult<Raster> {
        let items = self.search(request).await?;
        if items.is_empty() {
            return Err(CovariateError::Download(format!(
                "no {} scenes in {} over the area of interest",
                request.sensor.collection(),
                request.range
            )));
        }
        debug!(
            scenes = ?items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            "Selected scenes"
        );

        let len = request.grid.len();
        let mut bands = Vec::with_capacity(request.bands.len());
        for &band in &request.bands {
            let mut per_scene = Vec::with_capacity(items.len());
            for item in &items {
                match self.scene_band(item, request.sensor, band, request.grid, request.crs).await {
                    Ok(data) => per_scene.push(data),
                    Err(e) => warn!(scene = %item.id, band = band.as_str(), error = %e, "Skipping scene band"),
                }
            }
            if per_scene.is_empty() {
                return Err(CovariateError::Download(format!(
                    "no scene delivered the {} band",
                    band.as_str()
                )));
            }
            bands.push(Band::new(band.as_str(), median_composite(&per_scene, len)));
        }

        info!(scenes = items.len(), bands = bands.len(), "Reflectance composite ready");
        Raster::new(*request.grid, Some(request.crs), bands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote_sensing::DateRange;
    use bytes::Bytes;
    use covariate_common::AreaOfInterest;
    use std::sync::Mutex;
    use test_utils::{assert_approx_eq, constant_raster, fixtures};

    /// STAC API double: one search document and a GeoTIFF per asset URL.
    struct FakeCatalog {
        search: String,
        assets: HashMap<String, Bytes>,
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetcher for FakeCatalog {
        async fn fetch(&self, url: &str) -> CovResult<Bytes> {
            self.urls.lock().unwrap().push(url.to_string());
            if url.contains("/search?") {
                return Ok(Bytes::from(self.search.clone()));
            }
            self.assets
                .get(url)
                .cloned()
                .ok_or_else(|| CovariateError::Download(format!("404 {}", url)))
        }
    }

    fn asset_tiff(value: f32) -> Bytes {
        let scene = constant_raster(
            "b",
            fixtures::grid::utm_30m_small(),
            Some(fixtures::crs::UTM33N),
            value,
        );
        Bytes::from(raster_io::encode(&scene, 0).unwrap())
    }

    fn item(id: &str, cloud: f64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "properties": { "eo:cloud_cover": cloud, "proj:epsg": 32633 },
            "assets": {
                "red": { "href": format!("https://data.test/{}/red.tif", id),
                         "raster:bands": [{ "nodata": 0, "scale": 0.0001, "offset": 0 }] },
                "nir": { "href": format!("https://data.test/{}/nir.tif", id) }
            }
        })
    }

    fn catalog(items: Vec<serde_json::Value>, assets: &[(&str, f32)]) -> Arc<FakeCatalog> {
        Arc::new(FakeCatalog {
            search: serde_json::json!({ "type": "FeatureCollection", "features": items }).to_string(),
            assets: assets
                .iter()
                .map(|(url, v)| (url.to_string(), asset_tiff(*v)))
                .collect(),
            urls: Mutex::new(Vec::new()),
        })
    }

    fn aoi() -> AreaOfInterest {
        AreaOfInterest::from_bbox(&fixtures::bbox::UTM33N_BLOCK, fixtures::crs::UTM33N)
    }

    fn request<'a>(aoi: &'a AreaOfInterest, grid: &'a GridSpec, bands: Vec<SpectralBand>) -> SceneRequest<'a> {
        SceneRequest {
            sensor: Sensor::Sentinel2,
            aoi,
            grid,
            crs: fixtures::crs::UTM33N,
            range: "2023-06-01/2023-06-30".parse::<DateRange>().unwrap(),
            bands,
        }
    }

    #[test]
    fn test_median_composite() {
        let scenes = vec![vec![1.0, f32::NAN, 5.0], vec![3.0, f32::NAN, 1.0], vec![2.0, f32::NAN, f32::NAN]];
        let out = median_composite(&scenes, 3);
        assert_eq!(out[0], 2.0);
        assert!(out[1].is_nan());
        assert_eq!(out[2], 3.0);
    }

    #[test]
    fn test_s3_hrefs_use_https_endpoint() {
        assert_eq!(
            http_href("s3://usgs-landsat/collection02/a.TIF").unwrap(),
            "https://usgs-landsat.s3.amazonaws.com/collection02/a.TIF"
        );
        assert_eq!(http_href("https://x.test/a.tif").unwrap(), "https://x.test/a.tif");
        assert!(matches!(http_href("/vsi/local.tif"), Err(CovariateError::Download(_))));
    }

    #[test]
    fn test_search_url() {
        let source = StacSceneSource::new(catalog(vec![], &[]), "https://stac.test/v1/");
        let aoi = aoi();
        let grid = fixtures::grid::utm_30m_small();
        let url = source.search_url(&request(&aoi, &grid, vec![SpectralBand::Red])).unwrap();
        assert!(url.starts_with("https://stac.test/v1/search?collections=sentinel-2-l2a&bbox="));
        assert!(url.ends_with("&datetime=2023-06-01T00:00:00Z/2023-06-30T23:59:59Z&limit=100"));
    }

    #[tokio::test]
    async fn test_composite_from_least_cloudy_scenes() {
        let fetcher = catalog(
            vec![item("cloudy", 80.0), item("clear", 5.0), item("hazy", 20.0)],
            &[
                ("https://data.test/clear/red.tif", 1000.0),
                ("https://data.test/hazy/red.tif", 3000.0),
                ("https://data.test/cloudy/red.tif", 9000.0),
                ("https://data.test/clear/nir.tif", 4000.0),
                ("https://data.test/hazy/nir.tif", 6000.0),
            ],
        );
        let source = StacSceneSource::new(fetcher.clone(), "https://stac.test/v1").with_max_scenes(2);
        let aoi = aoi();
        let grid = fixtures::grid::utm_30m_small();

        let scene = source
            .reflectance(&request(&aoi, &grid, vec![SpectralBand::Red, SpectralBand::Nir]))
            .await
            .unwrap();

        assert_eq!(scene.band_names(), vec!["red", "nir"]);
        assert_eq!(scene.grid, grid);
        let center = grid.len() / 2;
        // median of the two clearest scenes, scaled by 1e-4
        assert_approx_eq!(scene.bands[0].data[center], 0.2, 1e-6);
        assert_approx_eq!(scene.bands[1].data[center], 0.5, 1e-6);
        assert!(!fetcher.urls.lock().unwrap().iter().any(|u| u.contains("cloudy")));
    }

    #[tokio::test]
    async fn test_no_scenes_is_download_error() {
        let source = StacSceneSource::new(catalog(vec![], &[]), "https://stac.test/v1");
        let aoi = aoi();
        let grid = fixtures::grid::utm_30m_small();
        let err = source
            .reflectance(&request(&aoi, &grid, vec![SpectralBand::Red]))
            .await
            .unwrap_err();
        assert!(matches!(err, CovariateError::Download(_)));
    }

    #[tokio::test]
    async fn test_missing_asset_everywhere_fails() {
        let fetcher = catalog(vec![item("clear", 5.0)], &[]);
        let source = StacSceneSource::new(fetcher, "https://stac.test/v1");
        let aoi = aoi();
        let grid = fixtures::grid::utm_30m_small();
        let err = source
            .reflectance(&request(&aoi, &grid, vec![SpectralBand::Swir1]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("swir1"), "{}", err);
    }

    #[test]
    fn test_landsat_asset_keys() {
        assert_eq!(Sensor::Landsat8.asset_key(SpectralBand::Nir), "nir08");
        assert_eq!(Sensor::Sentinel2.asset_key(SpectralBand::Swir2), "swir22");
        assert_eq!(Sensor::Landsat8.collection(), "landsat-c2-l2");
    }
}
