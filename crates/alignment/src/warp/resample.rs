//! Resampling onto the reference grid.

use covariate_common::{CrsCode, GridSpec, Raster};
use tracing::trace;

use super::warp_raster;
use crate::types::ResampleMethod;

/// Resample `raster` (already in `crs`) onto `target`.
///
/// A raster whose grid matches `target` within tolerance is copied value for
/// value and takes `target`'s exact geometry. Target cells outside the
/// raster become `NaN`.
pub fn resample_raster(
    raster: &Raster,
    target: &GridSpec,
    crs: CrsCode,
    method: ResampleMethod,
) -> Raster {
    if raster.grid.same_grid(target) {
        trace!(layer = raster.name(), "Grid already matches reference, copying");
        return Raster {
            grid: *target,
            crs: Some(crs),
            bands: raster.bands.clone(),
        };
    }

    warp_raster(raster, target, Some(crs), None, method)
}
