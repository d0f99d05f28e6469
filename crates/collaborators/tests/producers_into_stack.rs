//! Producer output fed straight into the alignment engine.

use std::sync::Arc;

use alignment::{align_covariates, AlignOptions, ResampleMethod};
use async_trait::async_trait;
use collaborators::{
    oblique_layers, DateRange, IndexCalculator, SceneRequest, SceneSource, Sensor, SpectralIndex,
};
use covariate_common::{AreaOfInterest, Band, CovResult, Raster};
use test_utils::{elevation_raster, fixtures};

/// Reflectance on a coarser geographic grid, each band with its own gradient.
struct GeographicScenes;

#[async_trait]
impl SceneSource for GeographicScenes {
    async fn reflectance(&self, request: &SceneRequest<'_>) -> CovResult<Raster> {
        let grid = fixtures::grid::wgs84_fine();
        let bands = request
            .bands
            .iter()
            .enumerate()
            .map(|(k, b)| {
                let slope = 1e-5 * (k as f32 + 1.0);
                let data = (0..grid.len()).map(|i| 0.1 + k as f32 * 0.05 + i as f32 * slope).collect();
                Band::new(b.as_str(), data)
            })
            .collect();
        Raster::new(grid, Some(fixtures::crs::WGS84), bands)
    }
}

#[tokio::test]
async fn test_indices_and_oblique_align_onto_reference() {
    let reference = elevation_raster(fixtures::grid::utm_30m(), Some(fixtures::crs::UTM33N));
    let aoi = AreaOfInterest::from_bbox(&fixtures::bbox::UTM33N_BLOCK, fixtures::crs::UTM33N);

    let calculator = IndexCalculator::new(Arc::new(GeographicScenes));
    let range: DateRange = "2023-04-01/2023-09-30".parse().unwrap();
    let indices = calculator
        .index_layers(&aoi, &reference, &[Sensor::Sentinel2], &[range], &[])
        .await
        .unwrap();
    let oblique = oblique_layers(&reference, 4).unwrap();

    let options = AlignOptions {
        method: ResampleMethod::Bilinear,
        remove_constant: false,
        verbose: false,
        ..Default::default()
    };
    let stack = align_covariates(&reference, vec![indices, oblique], &options).unwrap();

    let names = stack.names();
    assert_eq!(names.len(), SpectralIndex::ALL.len() + 4);
    assert_eq!(names[0], "S2_ndvi");
    assert_eq!(&names[names.len() - 4..], &["ogc_0", "ogc_45", "ogc_90", "ogc_135"]);

    assert_eq!(stack.raster().grid, reference.grid);
    assert_eq!(stack.raster().crs, reference.crs);
    let ndvi = stack.band("S2_ndvi").unwrap();
    assert_eq!(ndvi.valid_count(), reference.grid.len());
}

#[tokio::test]
async fn test_excluded_domains_never_reach_the_stack() {
    let reference = elevation_raster(fixtures::grid::utm_30m_small(), Some(fixtures::crs::UTM33N));
    let aoi = AreaOfInterest::from_bbox(&reference.grid.bbox(), fixtures::crs::UTM33N);

    let calculator = IndexCalculator::new(Arc::new(GeographicScenes));
    let range: DateRange = "2023-04-01/2023-09-30".parse().unwrap();
    let indices = calculator
        .index_layers(
            &aoi,
            &reference,
            &[Sensor::Sentinel2],
            &[range],
            &["water".parse().unwrap(), "burn".parse().unwrap()],
        )
        .await
        .unwrap();

    let stack = align_covariates(
        &reference,
        vec![indices],
        &AlignOptions {
            remove_constant: false,
            verbose: false,
            ..Default::default()
        },
    )
    .unwrap();

    let names = stack.names();
    assert!(names.contains(&"S2_ndvi"));
    assert!(!names.contains(&"S2_ndwi"));
    assert!(!names.contains(&"S2_nbr"));
}
