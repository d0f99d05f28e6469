//! The alignment pipeline: validate, flatten, warp every layer onto the
//! reference grid, stack, filter and name.

use std::borrow::Cow;
use std::time::Instant;

use covariate_common::{CovResult, CovariateError, CrsCode, Raster, RasterOrOther};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::AlignConfig;
use crate::flatten::flatten_inputs;
use crate::names::make_unique;
use crate::stack::{remove_constant_bands, stack_layers};
use crate::types::{AlignOptions, AlignedStack};
use crate::validate::validate_reference_grid;
use crate::warp::{crop_raster, resample_raster, warp_to_grid};

/// Log at info when verbose, debug otherwise.
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Align heterogeneous covariates onto the grid, CRS and extent of `grid`.
///
/// Inputs are flattened depth-first and non-raster elements dropped. Each
/// raster is reprojected when its CRS differs from the reference, cropped to
/// the reference extent (when `options.crop`) and resampled onto the
/// reference grid. A layer whose bands do not match its grid fails with
/// `Format` before any warping. The bands are then stacked in input order, constant bands
/// removed (when `options.remove_constant`) and duplicate names suffixed.
///
/// Any error aborts the whole call; no partial stack is returned.
pub fn align_covariates(
    grid: &Raster,
    inputs: Vec<RasterOrOther>,
    options: &AlignOptions,
) -> CovResult<AlignedStack> {
    let start = Instant::now();
    let ref_crs = validate_reference_grid(grid)?;
    let flat = flatten_inputs(inputs)?;

    if !flat.discarded.is_empty() {
        debug!(
            count = flat.discarded.len(),
            elements = ?flat.discarded,
            "Ignoring non-raster covariate elements"
        );
    }

    let layers = flat.rasters;
    for layer in &layers {
        layer.validate()?;
    }
    if let Some(orphan) = layers.iter().find(|l| l.crs.is_none()) {
        return Err(CovariateError::UndefinedCrs(orphan.name().to_string()));
    }

    progress!(
        options.verbose,
        layers = layers.len(),
        crs = %ref_crs,
        nx = grid.grid.nx,
        ny = grid.grid.ny,
        method = %options.method,
        "Aligning covariates to reference grid"
    );

    // The first error in input order wins.
    let results: Vec<CovResult<Raster>> = layers
        .par_iter()
        .map(|layer| align_layer(layer, grid, ref_crs, options))
        .collect();
    let aligned = results.into_iter().collect::<CovResult<Vec<_>>>()?;

    let mut stack = stack_layers(&grid.grid, ref_crs, aligned);

    if options.remove_constant {
        let removed = remove_constant_bands(&mut stack);
        if !removed.is_empty() {
            progress!(
                options.verbose,
                count = removed.len(),
                layers = ?removed,
                "Removed constant or empty covariate layers"
            );
        }
    }

    let names = make_unique(&stack.band_names());
    for (band, name) in stack.bands.iter_mut().zip(names) {
        if band.name != name {
            debug!(from = %band.name, to = %name, "Renamed duplicate covariate layer");
            band.name = name;
        }
    }

    progress!(
        options.verbose,
        bands = stack.bands.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Covariate alignment complete"
    );

    Ok(AlignedStack::new(stack))
}

/// Warp one layer onto the reference grid.
///
/// `reference` must already have passed `validate_reference_grid`, which
/// yields `ref_crs`.
pub fn align_layer(
    layer: &Raster,
    reference: &Raster,
    ref_crs: CrsCode,
    options: &AlignOptions,
) -> CovResult<Raster> {
    let crs = layer
        .crs
        .ok_or_else(|| CovariateError::UndefinedCrs(layer.name().to_string()))?;

    let mut current: Cow<'_, Raster> = Cow::Borrowed(layer);

    // Reprojection samples straight onto the reference pixels so each cell
    // is interpolated once, in the layer's own CRS.
    if !crs.same_space(&ref_crs) {
        current = Cow::Owned(warp_to_grid(&current, &reference.grid, ref_crs, options.method)?);
    }

    let extent = reference.grid.bbox();
    if options.crop && !extent.contains(&current.grid.bbox()) {
        match crop_raster(&current, &extent) {
            Some(cropped) => current = Cow::Owned(cropped),
            None => warn!(
                layer = layer.name(),
                "Layer does not overlap the reference extent; it will be all missing"
            ),
        }
    }

    let aligned = resample_raster(&current, &reference.grid, ref_crs, options.method);
    debug!(
        layer = layer.name(),
        bands = aligned.bands.len(),
        reprojected = !crs.same_space(&ref_crs),
        "Aligned covariate layer"
    );
    Ok(aligned)
}

/// Alignment engine bound to a configuration and, optionally, a dedicated
/// worker pool.
pub struct Aligner {
    config: AlignConfig,
    pool: Option<rayon::ThreadPool>,
}

impl Aligner {
    pub fn new(config: AlignConfig) -> CovResult<Self> {
        config.validate()?;

        let pool = match config.max_threads {
            Some(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("align-{}", i))
                    .build()
                    .map_err(|e| {
                        CovariateError::InvalidArgument(format!("cannot start worker pool: {}", e))
                    })?,
            ),
            None => None,
        };

        Ok(Self { config, pool })
    }

    /// Engine configured from `COVARIATE_*` environment variables.
    pub fn from_env() -> CovResult<Self> {
        Self::new(AlignConfig::from_env())
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    /// Align with the configured default options.
    pub fn align(&self, grid: &Raster, inputs: Vec<RasterOrOther>) -> CovResult<AlignedStack> {
        self.align_with(grid, inputs, &self.config.options)
    }

    /// Align with explicit per-call options.
    pub fn align_with(
        &self,
        grid: &Raster,
        inputs: Vec<RasterOrOther>,
        options: &AlignOptions,
    ) -> CovResult<AlignedStack> {
        match &self.pool {
            Some(pool) => pool.install(|| align_covariates(grid, inputs, options)),
            None => align_covariates(grid, inputs, options),
        }
    }
}

impl Default for Aligner {
    fn default() -> Self {
        Self {
            config: AlignConfig::default(),
            pool: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covariate_common::GridSpec;
    use test_utils::{constant_raster, fixtures, ramp_raster};

    fn reference() -> Raster {
        test_utils::elevation_raster(fixtures::grid::utm_30m_small(), Some(fixtures::crs::UTM33N))
    }

    #[test]
    fn test_align_layer_same_grid_copies() {
        let reference = reference();
        let layer = ramp_raster("r", reference.grid, Some(fixtures::crs::UTM33N));
        let out = align_layer(&layer, &reference, fixtures::crs::UTM33N, &AlignOptions::default())
            .unwrap();
        assert_eq!(out, layer);
    }

    #[test]
    fn test_align_layer_without_overlap_is_all_missing() {
        let reference = reference();
        let far = GridSpec::new(5, 5, 30.0, 30.0, 600_000.0, 5_900_000.0);
        let layer = ramp_raster("far", far, Some(fixtures::crs::UTM33N));
        let out = align_layer(&layer, &reference, fixtures::crs::UTM33N, &AlignOptions::default())
            .unwrap();
        assert_eq!(out.grid, reference.grid);
        assert!(out.bands[0].data.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_band_length_mismatch_is_format_error() {
        let reference = reference();
        let broken = Raster {
            grid: fixtures::grid::utm_1km_coarse(),
            crs: Some(fixtures::crs::UTM33N),
            bands: vec![covariate_common::Band::new("short", vec![1.0, 2.0, 3.0, 4.0, 5.0])],
        };
        let inputs = vec![
            ramp_raster("ok", reference.grid, Some(fixtures::crs::UTM33N)).into(),
            broken.into(),
        ];
        match align_covariates(&reference, inputs, &AlignOptions::default()) {
            Err(CovariateError::Format(msg)) => assert!(msg.contains("short"), "{}", msg),
            other => panic!("expected Format, got {:?}", other),
        }
    }

    #[test]
    fn test_first_undefined_crs_reported() {
        let reference = reference();
        let inputs = vec![
            ramp_raster("ok", reference.grid, Some(fixtures::crs::UTM33N)).into(),
            ramp_raster("first", reference.grid, None).into(),
            ramp_raster("second", reference.grid, None).into(),
        ];
        match align_covariates(&reference, inputs, &AlignOptions::default()) {
            Err(CovariateError::UndefinedCrs(name)) => assert_eq!(name, "first"),
            other => panic!("expected UndefinedCrs, got {:?}", other),
        }
    }

    #[test]
    fn test_aligner_with_dedicated_pool() {
        let reference = reference();
        let aligner = Aligner::new(AlignConfig {
            max_threads: Some(2),
            ..Default::default()
        })
        .unwrap();
        let stack = aligner
            .align(
                &reference,
                vec![
                    ramp_raster("a", reference.grid, Some(fixtures::crs::UTM33N)).into(),
                    constant_raster("flat", reference.grid, Some(fixtures::crs::UTM33N), 1.0).into(),
                ],
            )
            .unwrap();
        assert_eq!(stack.names(), vec!["a"]);
    }

    #[test]
    fn test_aligner_rejects_zero_threads() {
        let config = AlignConfig {
            max_threads: Some(0),
            ..Default::default()
        };
        assert!(matches!(Aligner::new(config), Err(CovariateError::InvalidArgument(_))));
    }
}
