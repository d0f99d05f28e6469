//! Raster warping: reprojection, cropping and resampling onto a target grid.
//!
//! Every warp reduces to the same inner loop: for each target cell center,
//! find the fractional source pixel it falls on and sample it with an
//! interpolation kernel. [`SampleMap`] holds those source positions so that
//! all bands of a raster share one coordinate pass.

pub mod crop;
pub mod interpolation;
pub mod reproject;
pub mod resample;

pub use crop::crop_raster;
pub use interpolation::{bilinear_interpolate, cubic_interpolate, interpolate, nearest_interpolate};
pub use reproject::{reproject_raster, reprojected_grid, warp_to_grid};
pub use resample::resample_raster;

use covariate_common::{Band, CrsCode, GridSpec, Raster};
use projection::CrsTransform;
use rayon::prelude::*;

use crate::types::ResampleMethod;

/// Source pixel positions for every cell of a target grid.
#[derive(Debug, Clone)]
pub struct SampleMap {
    target: GridSpec,
    source: GridSpec,
    /// Fractional (col, row) in the source grid, `None` where the target
    /// cell center has no counterpart in the source CRS.
    coords: Vec<Option<(f64, f64)>>,
}

impl SampleMap {
    /// Map `target` cells into `source`. `to_source` converts target CRS
    /// coordinates to source CRS coordinates; pass `None` when both grids
    /// share a CRS.
    pub fn build(target: &GridSpec, source: &GridSpec, to_source: Option<&CrsTransform>) -> Self {
        let coords = (0..target.ny)
            .into_par_iter()
            .flat_map_iter(|row| {
                (0..target.nx).map(move |col| {
                    let (x, y) = target.cell_center(col, row);
                    let (sx, sy) = match to_source {
                        Some(t) => t.transform(x, y)?,
                        None => (x, y),
                    };
                    Some(source.fractional_index(sx, sy))
                })
            })
            .collect();

        Self {
            target: *target,
            source: *source,
            coords,
        }
    }

    pub fn target(&self) -> &GridSpec {
        &self.target
    }

    /// Sample one source band onto the target grid.
    pub fn apply(&self, data: &[f32], method: ResampleMethod) -> Vec<f32> {
        let (w, h) = (self.source.nx, self.source.ny);
        self.coords
            .par_iter()
            .map(|c| match c {
                Some((x, y)) => interpolate(method, data, w, h, *x, *y),
                None => f32::NAN,
            })
            .collect()
    }
}

/// Warp every band of `raster` onto `target` in `target_crs`.
pub(crate) fn warp_raster(
    raster: &Raster,
    target: &GridSpec,
    target_crs: Option<CrsCode>,
    to_source: Option<&CrsTransform>,
    method: ResampleMethod,
) -> Raster {
    let map = SampleMap::build(target, &raster.grid, to_source);
    let bands = raster
        .bands
        .iter()
        .map(|b| Band::new(b.name.clone(), map.apply(&b.data, method)))
        .collect();

    Raster {
        grid: *target,
        crs: target_crs,
        bands,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_map_identity_is_exact() {
        let grid = GridSpec::new(3, 2, 10.0, 10.0, 0.0, 20.0);
        let map = SampleMap::build(&grid, &grid, None);
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(map.apply(&data, ResampleMethod::Bilinear), data);
        assert_eq!(map.apply(&data, ResampleMethod::Cubic), data);
    }

    #[test]
    fn test_sample_map_outside_source_is_nan() {
        let source = GridSpec::new(2, 2, 10.0, 10.0, 0.0, 20.0);
        let target = GridSpec::new(4, 2, 10.0, 10.0, 0.0, 20.0);
        let map = SampleMap::build(&target, &source, None);
        let out = map.apply(&[1.0, 2.0, 3.0, 4.0], ResampleMethod::Nearest);
        assert_eq!(&out[0..2], &[1.0, 2.0]);
        assert!(out[2].is_nan() && out[3].is_nan());
    }
}
