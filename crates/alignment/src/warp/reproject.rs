//! Reprojection of whole rasters between coordinate systems.

use covariate_common::{CovResult, CovariateError, CrsCode, GridSpec, Raster};
use projection::CrsTransform;
use tracing::debug;

use super::warp_raster;
use crate::types::ResampleMethod;

/// Samples per edge when transforming a raster's extent.
const EXTENT_DENSIFY: usize = 20;

/// Grid of the reprojected raster: the transformed extent of `grid`, split
/// into the same number of cells as the source.
pub fn reprojected_grid(grid: &GridSpec, from: CrsCode, to: CrsCode) -> CovResult<GridSpec> {
    let transform = CrsTransform::new(from, to);
    let extent = transform.transform_bbox(&grid.bbox(), EXTENT_DENSIFY)?;
    if !(extent.width() > 0.0 && extent.height() > 0.0) {
        return Err(CovariateError::Projection(format!(
            "extent of {}x{} grid collapses when transformed from {} to {}",
            grid.nx, grid.ny, from, to
        )));
    }
    Ok(GridSpec::from_bbox(&extent, grid.nx, grid.ny))
}

/// Reproject `raster` into `target_crs`.
///
/// The output keeps the source pixel counts and covers the transformed
/// extent. Cells whose centers fall outside the source become `NaN`. A
/// raster already in `target_crs` is returned unchanged.
pub fn reproject_raster(
    raster: &Raster,
    target_crs: CrsCode,
    method: ResampleMethod,
) -> CovResult<Raster> {
    let source_crs = raster
        .crs
        .ok_or_else(|| CovariateError::UndefinedCrs(raster.name().to_string()))?;

    if source_crs.same_space(&target_crs) {
        let mut out = raster.clone();
        out.crs = Some(target_crs);
        return Ok(out);
    }

    let grid = reprojected_grid(&raster.grid, source_crs, target_crs)?;
    let inverse = CrsTransform::new(target_crs, source_crs);

    debug!(
        layer = raster.name(),
        from = %source_crs,
        to = %target_crs,
        nx = grid.nx,
        ny = grid.ny,
        "Reprojecting layer"
    );

    Ok(warp_raster(raster, &grid, Some(target_crs), Some(&inverse), method))
}

/// Reproject `raster` straight onto a caller-chosen grid in `target_crs`.
pub fn warp_to_grid(
    raster: &Raster,
    target: &GridSpec,
    target_crs: CrsCode,
    method: ResampleMethod,
) -> CovResult<Raster> {
    let source_crs = raster
        .crs
        .ok_or_else(|| CovariateError::UndefinedCrs(raster.name().to_string()))?;

    let inverse = CrsTransform::new(target_crs, source_crs);
    let to_source = (!inverse.is_identity()).then_some(&inverse);
    Ok(warp_raster(raster, target, Some(target_crs), to_source, method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{assert_approx_eq, constant_raster, fixtures, ramp_raster};

    #[test]
    fn test_reproject_preserves_dimensions() {
        let src = ramp_raster("r", fixtures::grid::wgs84_fine(), Some(fixtures::crs::WGS84));
        let out = reproject_raster(&src, fixtures::crs::UTM33N, ResampleMethod::Nearest).unwrap();

        assert_eq!(out.grid.nx, src.grid.nx);
        assert_eq!(out.grid.ny, src.grid.ny);
        assert_eq!(out.crs, Some(fixtures::crs::UTM33N));
        assert!(out.grid.bbox().contains(&fixtures::bbox::UTM33N_BLOCK));
    }

    #[test]
    fn test_reproject_constant_stays_constant() {
        let src = constant_raster("c", fixtures::grid::wgs84_fine(), Some(fixtures::crs::WGS84), 7.0);
        let out = reproject_raster(&src, fixtures::crs::UTM33N, ResampleMethod::Bilinear).unwrap();

        let valid: Vec<f32> = out.bands[0].data.iter().cloned().filter(|v| !v.is_nan()).collect();
        assert!(valid.len() > out.grid.len() / 2);
        for v in valid {
            assert_approx_eq!(v, 7.0, 1e-5);
        }
    }

    #[test]
    fn test_same_crs_is_noop() {
        let src = ramp_raster("r", fixtures::grid::utm_30m_small(), Some(fixtures::crs::UTM33N));
        let out = reproject_raster(&src, fixtures::crs::UTM33N, ResampleMethod::Cubic).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn test_warp_to_grid_covers_target() {
        let src = constant_raster("c", fixtures::grid::wgs84_fine(), Some(fixtures::crs::WGS84), 2.0);
        let target = fixtures::grid::utm_30m_small();
        let out = warp_to_grid(&src, &target, fixtures::crs::UTM33N, ResampleMethod::Nearest).unwrap();
        assert_eq!(out.grid, target);
        assert!(out.bands[0].data.iter().all(|v| *v == 2.0));
    }

    #[test]
    fn test_undefined_crs() {
        let src = ramp_raster("orphan", fixtures::grid::utm_30m_small(), None);
        match reproject_raster(&src, fixtures::crs::UTM33N, ResampleMethod::Nearest) {
            Err(CovariateError::UndefinedCrs(name)) => assert_eq!(name, "orphan"),
            other => panic!("expected UndefinedCrs, got {:?}", other),
        }
    }
}
