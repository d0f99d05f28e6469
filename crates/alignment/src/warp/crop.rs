//! Cropping rasters to an extent.

use covariate_common::{Band, BoundingBox, Raster};

/// Crop `raster` to the whole cells overlapping `extent`.
///
/// Returns `None` when the raster does not overlap `extent` at all. A
/// raster already inside `extent` is returned as is.
pub fn crop_raster(raster: &Raster, extent: &BoundingBox) -> Option<Raster> {
    let (col0, row0, window) = raster.grid.window(extent)?;

    if window.nx == raster.grid.nx && window.ny == raster.grid.ny {
        return Some(raster.clone());
    }

    let src_nx = raster.grid.nx;
    let bands = raster
        .bands
        .iter()
        .map(|b| {
            let mut data = Vec::with_capacity(window.len());
            for row in row0..row0 + window.ny {
                let start = row * src_nx + col0;
                data.extend_from_slice(&b.data[start..start + window.nx]);
            }
            Band::new(b.name.clone(), data)
        })
        .collect();

    Some(Raster {
        grid: window,
        crs: raster.crs,
        bands,
    })
}
