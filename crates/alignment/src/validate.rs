//! Reference grid checks.

use covariate_common::{CovResult, CovariateError, CrsCode, Raster, RasterOrOther};

/// Check that `grid` can serve as the alignment target and return its CRS.
///
/// The grid must carry a projected CRS and a non-degenerate geometry.
pub fn validate_reference_grid(grid: &Raster) -> CovResult<CrsCode> {
    let crs = grid
        .crs
        .ok_or_else(|| CovariateError::InvalidGrid("reference grid has no CRS".to_string()))?;

    if crs.is_geographic() {
        return Err(CovariateError::InvalidGrid(format!(
            "reference grid uses geographic {}; a projected CRS is required",
            crs
        )));
    }

    let g = &grid.grid;
    if g.is_empty() {
        return Err(CovariateError::InvalidGrid(format!(
            "reference grid has no cells ({}x{})",
            g.nx, g.ny
        )));
    }
    if !(g.dx.is_finite() && g.dy.is_finite() && g.dx > 0.0 && g.dy > 0.0) {
        return Err(CovariateError::InvalidGrid(format!(
            "reference grid resolution {}x{} is not positive",
            g.dx, g.dy
        )));
    }
    if !(g.origin_x.is_finite() && g.origin_y.is_finite()) {
        return Err(CovariateError::InvalidGrid(
            "reference grid origin is not finite".to_string(),
        ));
    }

    Ok(crs)
}

/// Accept a reference grid handed over as a producer element.
pub fn reference_raster(value: &RasterOrOther) -> CovResult<&Raster> {
    match value {
        RasterOrOther::Raster(r) => {
            validate_reference_grid(r)?;
            Ok(r)
        }
        RasterOrOther::Collection(_) => Err(CovariateError::InvalidGrid(
            "reference grid is a collection, not a raster".to_string(),
        )),
        RasterOrOther::Other(label) => Err(CovariateError::InvalidGrid(format!(
            "reference grid is not a raster ({})",
            label
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{elevation_raster, fixtures};

    #[test]
    fn test_projected_grid_accepted() {
        let r = elevation_raster(fixtures::grid::utm_30m_small(), Some(fixtures::crs::UTM33N));
        assert_eq!(validate_reference_grid(&r).unwrap(), fixtures::crs::UTM33N);
    }

    #[test]
    fn test_geographic_grid_rejected() {
        let r = elevation_raster(fixtures::grid::wgs84_fine(), Some(fixtures::crs::WGS84));
        assert!(matches!(validate_reference_grid(&r), Err(CovariateError::InvalidGrid(_))));
    }

    #[test]
    fn test_missing_crs_rejected() {
        let r = elevation_raster(fixtures::grid::utm_30m_small(), None);
        assert!(matches!(validate_reference_grid(&r), Err(CovariateError::InvalidGrid(_))));
    }

    #[test]
    fn test_non_raster_rejected() {
        let value = RasterOrOther::other("scene metadata");
        assert!(matches!(reference_raster(&value), Err(CovariateError::InvalidGrid(_))));
    }
}
