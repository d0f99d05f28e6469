//! Oblique geographic coordinates: the grid's coordinates rotated through a
//! fan of angles, giving tree-based models access to diagonal gradients.

use std::f64::consts::PI;

use covariate_common::{Band, CovResult, CovariateError, Raster, RasterOrOther};
use tracing::debug;

/// Fewest directions accepted.
pub const MIN_DIRECTIONS: usize = 4;

/// Layer name for an angle in degrees: `ogc_30`, or `ogc_25.7` for
/// fractional angles.
pub fn layer_name(degrees: f64) -> String {
    let rounded = degrees.round();
    if (degrees - rounded).abs() < 1e-9 {
        format!("ogc_{}", rounded as i64)
    } else {
        format!("ogc_{:.1}", degrees)
    }
}

/// One layer per angle θ_k = kπ/n (k = 0..n), valued `x cos θ + y sin θ` at
/// each cell centre relative to the grid centre.
pub fn oblique_layers(grid: &Raster, direction_count: usize) -> CovResult<RasterOrOther> {
    if direction_count < MIN_DIRECTIONS {
        return Err(CovariateError::InvalidArgument(format!(
            "at least {} directions are required, got {}",
            MIN_DIRECTIONS, direction_count
        )));
    }
    let crs = grid
        .crs
        .ok_or_else(|| CovariateError::UndefinedCrs(grid.name().to_string()))?;

    let g = grid.grid;
    let (cx, cy) = g.bbox().center();
    let centres: Vec<(f64, f64)> = (0..g.ny)
        .flat_map(|row| (0..g.nx).map(move |col| (col, row)))
        .map(|(col, row)| {
            let (x, y) = g.cell_center(col, row);
            (x - cx, y - cy)
        })
        .collect();

    let bands = (0..direction_count)
        .map(|k| {
            let theta = k as f64 * PI / direction_count as f64;
            let (sin, cos) = theta.sin_cos();
            let data = centres
                .iter()
                .map(|&(x, y)| (x * cos + y * sin) as f32)
                .collect();
            Band::new(layer_name(theta.to_degrees()), data)
        })
        .collect();

    debug!(directions = direction_count, "Computed oblique coordinates");
    Ok(Raster::new(g, Some(crs), bands)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{assert_approx_eq, elevation_raster, fixtures};

    fn raster(value: RasterOrOther) -> Raster {
        match value {
            RasterOrOther::Raster(r) => r,
            other => panic!("expected a raster, got {:?}", other),
        }
    }

    #[test]
    fn test_layer_names() {
        let grid = elevation_raster(fixtures::grid::simple_10x10(), Some(fixtures::crs::UTM33N));
        let out = raster(oblique_layers(&grid, 6).unwrap());
        assert_eq!(
            out.band_names(),
            vec!["ogc_0", "ogc_30", "ogc_60", "ogc_90", "ogc_120", "ogc_150"]
        );
        assert_eq!(layer_name(180.0 / 7.0), "ogc_25.7");
    }

    #[test]
    fn test_axes_match_centred_coordinates() {
        let grid = elevation_raster(fixtures::grid::simple_10x10(), Some(fixtures::crs::UTM33N));
        let out = raster(oblique_layers(&grid, 4).unwrap());

        // simple_10x10 spans 0..10 in both axes, centre (5, 5)
        let idx = grid.grid.flat_index(0, 0);
        let (x, y) = (0.5 - 5.0, 9.5 - 5.0);
        assert_approx_eq!(out.bands[0].data[idx], x, 1e-5);
        assert_approx_eq!(out.bands[2].data[idx], y, 1e-5);
        let diag = (x * (PI / 4.0).cos() + y * (PI / 4.0).sin()) as f32;
        assert_approx_eq!(out.bands[1].data[idx], diag, 1e-5);
    }

    #[test]
    fn test_too_few_directions() {
        let grid = elevation_raster(fixtures::grid::simple_10x10(), Some(fixtures::crs::UTM33N));
        assert!(matches!(
            oblique_layers(&grid, 3),
            Err(CovariateError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_requires_crs() {
        let grid = elevation_raster(fixtures::grid::simple_10x10(), None);
        assert!(matches!(oblique_layers(&grid, 4), Err(CovariateError::UndefinedCrs(_))));
    }
}
