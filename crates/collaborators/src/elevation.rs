//! Reference grid acquisition from a digital elevation model service.

use std::sync::Arc;

use alignment::{warp::reprojected_grid, warp_to_grid, ResampleMethod};
use async_trait::async_trait;
use covariate_common::{
    AreaOfInterest, BoundingBox, CovResult, CovariateError, CrsCode, GridSpec, Raster,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::CollaboratorConfig;
use crate::fetch::Fetcher;
use crate::geometry::{mask_outside, project_geometry};

/// Name given to the elevation band of the reference grid.
pub const ELEVATION_BAND: &str = "elevation";

/// How the DEM is clipped to the area of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipMode {
    /// Keep the full bounding box of the AOI.
    #[default]
    BoundingBox,
    /// Additionally mask cells whose centers fall outside the AOI polygon.
    Polygon,
}

/// Provider of DEM tiles for a geographic extent.
#[async_trait]
pub trait DemSource: Send + Sync {
    /// Fetch a DEM covering `bbox` (WGS84 longitude/latitude).
    async fn fetch_dem(&self, bbox: &BoundingBox, api_key: &str) -> CovResult<Raster>;
}

/// DEM source speaking the OpenTopography GlobalDEM REST API, decoded from
/// its GeoTIFF output.
pub struct HttpDemSource {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
    dem_type: String,
}

impl HttpDemSource {
    pub fn new(fetcher: Arc<dyn Fetcher>, base_url: impl Into<String>, dem_type: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
            dem_type: dem_type.into(),
        }
    }

    pub fn request_url(&self, bbox: &BoundingBox, api_key: &str) -> String {
        format!(
            "{}?demtype={}&south={}&north={}&west={}&east={}&outputFormat=GTiff&API_Key={}",
            self.base_url, self.dem_type, bbox.min_y, bbox.max_y, bbox.min_x, bbox.max_x, api_key
        )
    }
}

#[async_trait]
impl DemSource for HttpDemSource {
    async fn fetch_dem(&self, bbox: &BoundingBox, api_key: &str) -> CovResult<Raster> {
        let body = self.fetcher.fetch(&self.request_url(bbox, api_key)).await?;
        let dem = raster_io::decode(&body, ELEVATION_BAND)?;
        Ok(Raster {
            crs: dem.crs.or(Some(CrsCode::Epsg4326)),
            ..dem
        })
    }
}

/// Builds the reference grid for an area of interest.
pub struct ElevationRetriever {
    source: Arc<dyn DemSource>,
    api_key: Option<String>,
    buffer_deg: f64,
}

impl ElevationRetriever {
    pub fn new(source: Arc<dyn DemSource>, api_key: Option<String>) -> Self {
        Self {
            source,
            api_key,
            buffer_deg: 0.01,
        }
    }

    /// HTTP-backed retriever from configuration.
    pub fn from_config(config: &CollaboratorConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let source = HttpDemSource::new(fetcher, &config.elevation_url, &config.dem_type);
        Self::new(Arc::new(source), config.elevation_api_key.clone()).with_buffer(config.dem_buffer_deg)
    }

    pub fn with_buffer(mut self, buffer_deg: f64) -> Self {
        self.buffer_deg = buffer_deg;
        self
    }

    /// Fetch a DEM over `aoi` and turn it into a reference grid.
    ///
    /// A geographic DEM is reprojected to the UTM zone of the AOI centre,
    /// on square cells of roughly the native resolution, over the AOI
    /// bounding box. With `ClipMode::Polygon` cells outside the AOI become
    /// missing.
    #[instrument(skip(self, aoi), fields(crs = ?aoi.crs))]
    pub async fn reference_grid(&self, aoi: &AreaOfInterest, clip: ClipMode) -> CovResult<Raster> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| CovariateError::MissingCredential("ELEVATION_API_KEY".to_string()))?;

        if !aoi.geometry.is_polygonal() {
            return Err(CovariateError::InvalidGeometry(
                "area of interest must be a polygon or multipolygon".to_string(),
            ));
        }
        let aoi_crs = aoi
            .crs
            .ok_or_else(|| CovariateError::UndefinedCrs("area of interest".to_string()))?;

        let lonlat = project_geometry(&aoi.geometry, aoi_crs, CrsCode::Epsg4326)?;
        let lonlat_bbox = lonlat
            .bbox()
            .ok_or_else(|| CovariateError::InvalidGeometry("area of interest has no vertices".to_string()))?;
        let request = lonlat_bbox.expand(self.buffer_deg);

        debug!(bbox = ?request, "Requesting DEM");
        let dem = self.source.fetch_dem(&request, api_key).await?.with_name(ELEVATION_BAND);
        let dem_crs = dem.crs.unwrap_or(CrsCode::Epsg4326);
        let dem = Raster { crs: Some(dem_crs), ..dem };

        let target_crs = if dem_crs.is_geographic() {
            let (lon, lat) = lonlat_bbox.center();
            CrsCode::utm_for_lonlat(lon, lat)
        } else {
            dem_crs
        };

        let footprint = project_geometry(&aoi.geometry, aoi_crs, target_crs)?;
        let extent = footprint
            .bbox()
            .ok_or_else(|| CovariateError::InvalidGeometry("area of interest has no vertices".to_string()))?;

        let native = if dem_crs.same_space(&target_crs) {
            dem.grid
        } else {
            reprojected_grid(&dem.grid, dem_crs, target_crs)?
        };
        let res = (native.dx + native.dy) / 2.0;
        let grid = GridSpec::from_resolution(&extent, res, res);

        let mut reference = warp_to_grid(&dem, &grid, target_crs, ResampleMethod::Bilinear)?;

        if clip == ClipMode::Polygon {
            let masked = mask_outside(&mut reference, &footprint);
            debug!(masked, "Masked cells outside area of interest");
        }

        if reference.bands[0].valid_count() == 0 {
            return Err(CovariateError::Format(
                "DEM has no valid cells over the area of interest".to_string(),
            ));
        }

        info!(
            crs = %target_crs,
            nx = grid.nx,
            ny = grid.ny,
            resolution = res,
            clip = ?clip,
            "Reference grid ready"
        );
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covariate_common::Geometry;
    use std::sync::Mutex;
    use test_utils::{assert_approx_eq, elevation_raster, fixtures};

    /// Serves a fixed geographic DEM and records requests.
    struct FixedDem {
        requests: Mutex<Vec<BoundingBox>>,
    }

    impl FixedDem {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DemSource for FixedDem {
        async fn fetch_dem(&self, bbox: &BoundingBox, _api_key: &str) -> CovResult<Raster> {
            self.requests.lock().unwrap().push(*bbox);
            Ok(elevation_raster(fixtures::grid::wgs84_fine(), Some(fixtures::crs::WGS84)))
        }
    }

    fn block_aoi() -> AreaOfInterest {
        AreaOfInterest::from_bbox(&fixtures::bbox::UTM33N_BLOCK, fixtures::crs::UTM33N)
    }

    fn retriever(source: Arc<FixedDem>) -> ElevationRetriever {
        ElevationRetriever::new(source, Some("key".to_string()))
    }

    #[tokio::test]
    async fn test_missing_key() {
        let r = ElevationRetriever::new(FixedDem::new(), None);
        let err = r.reference_grid(&block_aoi(), ClipMode::BoundingBox).await.unwrap_err();
        assert!(matches!(err, CovariateError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn test_point_aoi_rejected() {
        let aoi = AreaOfInterest::new(Geometry::Point((15.0, 52.0)), Some(fixtures::crs::WGS84));
        let err = retriever(FixedDem::new())
            .reference_grid(&aoi, ClipMode::BoundingBox)
            .await
            .unwrap_err();
        assert!(matches!(err, CovariateError::InvalidGeometry(_)));
    }

    #[tokio::test]
    async fn test_undefined_aoi_crs() {
        let aoi = AreaOfInterest::new(block_aoi().geometry, None);
        let err = retriever(FixedDem::new())
            .reference_grid(&aoi, ClipMode::BoundingBox)
            .await
            .unwrap_err();
        assert!(matches!(err, CovariateError::UndefinedCrs(_)));
    }

    #[tokio::test]
    async fn test_bbox_clip_builds_utm_grid() {
        let source = FixedDem::new();
        let grid = retriever(source.clone())
            .reference_grid(&block_aoi(), ClipMode::BoundingBox)
            .await
            .unwrap();

        assert_eq!(grid.crs, Some(fixtures::crs::UTM33N));
        assert_eq!(grid.name(), ELEVATION_BAND);
        assert_approx_eq!(grid.grid.dx, grid.grid.dy, 1e-9);
        assert!(grid.grid.bbox().contains(&fixtures::bbox::UTM33N_BLOCK));
        assert_eq!(grid.bands[0].valid_count(), grid.grid.len());

        let requests = source.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (w, s, e, n) = fixtures::bbox::WGS84_AROUND_BLOCK;
        assert!(BoundingBox::new(w, s, e, n).contains(&requests[0]));
    }

    #[tokio::test]
    async fn test_polygon_clip_masks_outside() {
        let b = fixtures::bbox::UTM33N_BLOCK;
        let triangle = Geometry::Polygon(vec![vec![
            (b.min_x, b.min_y),
            (b.max_x, b.min_y),
            (b.min_x, b.max_y),
            (b.min_x, b.min_y),
        ]]);
        let aoi = AreaOfInterest::new(triangle, Some(fixtures::crs::UTM33N));

        let grid = retriever(FixedDem::new())
            .reference_grid(&aoi, ClipMode::Polygon)
            .await
            .unwrap();

        let valid = grid.bands[0].valid_count();
        assert!(valid > 0 && valid < grid.grid.len());
        // north-east corner lies outside the triangle
        assert!(grid.get(0, grid.grid.nx - 1, 0).unwrap().is_nan());
    }

    /// Answers every request with a fixed body.
    struct Canned(bytes::Bytes);

    #[async_trait]
    impl Fetcher for Canned {
        async fn fetch(&self, _url: &str) -> CovResult<bytes::Bytes> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_http_source_decodes_geotiff() {
        let dem = elevation_raster(fixtures::grid::wgs84_fine(), None);
        let body = bytes::Bytes::from(raster_io::encode(&dem, 0).unwrap());
        let source = HttpDemSource::new(Arc::new(Canned(body)), "https://dem.test/api", "COP30");

        let got = source
            .fetch_dem(&BoundingBox::new(14.0, 51.0, 15.0, 52.0), "k")
            .await
            .unwrap();

        // Untagged responses are taken as WGS84.
        assert_eq!(got.crs, Some(CrsCode::Epsg4326));
        assert_eq!(got.name(), ELEVATION_BAND);
        assert_eq!(got.grid, dem.grid);
        assert_eq!(got.bands[0].data, dem.bands[0].data);
    }

    #[tokio::test]
    async fn test_http_source_rejects_error_page() {
        let body = bytes::Bytes::from_static(b"<html>Invalid API key</html>");
        let source = HttpDemSource::new(Arc::new(Canned(body)), "https://dem.test/api", "COP30");
        let err = source
            .fetch_dem(&BoundingBox::new(14.0, 51.0, 15.0, 52.0), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, CovariateError::Format(_)), "{:?}", err);
    }

    #[test]
    fn test_request_url() {
        struct Never;
        #[async_trait]
        impl Fetcher for Never {
            async fn fetch(&self, _url: &str) -> CovResult<bytes::Bytes> {
                Err(CovariateError::Download("offline".to_string()))
            }
        }
        let source = HttpDemSource::new(Arc::new(Never), "https://dem.test/api", "COP30");
        let url = source.request_url(&BoundingBox::new(14.0, 51.0, 15.0, 52.0), "k");
        assert_eq!(
            url,
            "https://dem.test/api?demtype=COP30&south=51&north=52&west=14&east=15&outputFormat=GTiff&API_Key=k"
        );
    }
}
