//! Geometry helpers shared by the producers.

use covariate_common::{CovResult, CovariateError, CrsCode, Geometry, Raster};
use projection::CrsTransform;

/// Transform every vertex of `geometry` from `from` to `to`.
pub fn project_geometry(geometry: &Geometry, from: CrsCode, to: CrsCode) -> CovResult<Geometry> {
    let transform = CrsTransform::new(from, to);
    if transform.is_identity() {
        return Ok(geometry.clone());
    }

    let mut failed = false;
    let projected = geometry.map_coords(|x, y| match transform.transform(x, y) {
        Some(p) => p,
        None => {
            failed = true;
            (f64::NAN, f64::NAN)
        }
    });

    if failed {
        return Err(CovariateError::Projection(format!(
            "geometry has vertices outside the domain of {} when transformed from {}",
            to, from
        )));
    }
    Ok(projected)
}

/// Set cells whose centers fall outside `geometry` to `NaN`. Returns the
/// number of cells masked.
pub fn mask_outside(raster: &mut Raster, geometry: &Geometry) -> usize {
    let grid = raster.grid;
    let outside: Vec<usize> = (0..grid.ny)
        .flat_map(|row| (0..grid.nx).map(move |col| (col, row)))
        .filter(|&(col, row)| {
            let (x, y) = grid.cell_center(col, row);
            !geometry.contains_point(x, y)
        })
        .map(|(col, row)| grid.flat_index(col, row))
        .collect();

    for band in &mut raster.bands {
        for &i in &outside {
            band.data[i] = f32::NAN;
        }
    }
    outside.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use covariate_common::GridSpec;
    use test_utils::assert_approx_eq;

    #[test]
    fn test_identity_projection_is_clone() {
        let g = Geometry::Point((1.0, 2.0));
        assert_eq!(project_geometry(&g, CrsCode::Epsg4326, CrsCode::Epsg4269).unwrap(), g);
    }

    #[test]
    fn test_projection_to_utm() {
        let g = Geometry::Point((15.0, 52.0));
        let utm = CrsCode::Utm { zone: 33, north: true };
        match project_geometry(&g, CrsCode::Epsg4326, utm).unwrap() {
            Geometry::Point((x, y)) => {
                assert_approx_eq!(x, 500_000.0, 1e-3);
                assert!(y > 5_700_000.0 && y < 5_800_000.0);
            }
            other => panic!("unexpected geometry {:?}", other),
        }
    }

    #[test]
    fn test_mask_outside_triangle() {
        let grid = GridSpec::new(4, 4, 1.0, 1.0, 0.0, 4.0);
        let mut raster = Raster::filled("r", grid, None, 1.0);
        let triangle = Geometry::Polygon(vec![vec![(0.0, 0.0), (4.0, 0.0), (0.0, 4.0), (0.0, 0.0)]]);

        let masked = mask_outside(&mut raster, &triangle);
        // centers on the hypotenuse count as outside
        assert_eq!(masked, 10);
        // south-west corner cell stays, north-east corner cell is masked
        assert_eq!(raster.get(0, 0, 3), Some(1.0));
        assert!(raster.get(0, 3, 0).unwrap().is_nan());
    }
}
