//! Stack assembly and the variance filter.

use covariate_common::{Band, CrsCode, GridSpec, Raster};

/// Summary statistics of one band, ignoring missing cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandStats {
    pub valid: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` with fewer than two valid cells.
    pub std_dev: Option<f64>,
}

impl BandStats {
    /// Welford's single pass over the valid cells.
    pub fn compute(data: &[f32]) -> Self {
        let mut n = 0usize;
        let mut mean = 0.0f64;
        let mut m2 = 0.0f64;

        for v in data.iter().filter(|v| !v.is_nan()) {
            let v = *v as f64;
            n += 1;
            let delta = v - mean;
            mean += delta / n as f64;
            m2 += delta * (v - mean);
        }

        let std_dev = if n >= 2 {
            Some((m2 / (n - 1) as f64).sqrt())
        } else {
            None
        };

        Self {
            valid: n,
            mean,
            std_dev,
        }
    }

    /// Zero or undefined spread.
    pub fn is_constant(&self) -> bool {
        match self.std_dev {
            Some(sd) => sd == 0.0 || !sd.is_finite(),
            None => true,
        }
    }
}

/// Concatenate the bands of aligned layers, in order, into one raster on
/// `grid`.
pub fn stack_layers(grid: &GridSpec, crs: CrsCode, layers: Vec<Raster>) -> Raster {
    let bands: Vec<Band> = layers.into_iter().flat_map(|r| r.bands).collect();
    Raster {
        grid: *grid,
        crs: Some(crs),
        bands,
    }
}

/// Drop constant or empty bands in place, returning the removed names in
/// stack order.
pub fn remove_constant_bands(raster: &mut Raster) -> Vec<String> {
    let mut removed = Vec::new();
    raster.bands.retain(|b| {
        if BandStats::compute(&b.data).is_constant() {
            removed.push(b.name.clone());
            false
        } else {
            true
        }
    });
    removed
}
