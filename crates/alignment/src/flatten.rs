//! Flattening of producer output into a plain list of rasters.

use covariate_common::{CovResult, CovariateError, Raster, RasterOrOther};
use tracing::debug;

/// Rasters found in producer output, plus labels of the elements dropped.
#[derive(Debug, Default)]
pub struct Flattened {
    pub rasters: Vec<Raster>,
    pub discarded: Vec<String>,
}

/// Flatten nested producer output depth-first, keeping rasters in order and
/// discarding everything else.
///
/// Fails with `EmptyInput` when nothing is left after flattening and
/// `NoValidLayers` when elements remain but none is a raster.
pub fn flatten_inputs(inputs: Vec<RasterOrOther>) -> CovResult<Flattened> {
    if inputs.is_empty() {
        return Err(CovariateError::EmptyInput);
    }

    let mut out = Flattened::default();
    for item in inputs {
        collect(item, &mut out);
    }

    if out.rasters.is_empty() && out.discarded.is_empty() {
        return Err(CovariateError::EmptyInput);
    }
    if out.rasters.is_empty() {
        return Err(CovariateError::NoValidLayers(out.discarded.len()));
    }

    debug!(
        rasters = out.rasters.len(),
        discarded = out.discarded.len(),
        "Flattened covariate inputs"
    );
    Ok(out)
}

fn collect(item: RasterOrOther, out: &mut Flattened) {
    match item {
        RasterOrOther::Raster(r) => out.rasters.push(r),
        RasterOrOther::Collection(items) => {
            for inner in items {
                collect(inner, out);
            }
        }
        RasterOrOther::Other(label) => out.discarded.push(label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{constant_raster, fixtures};

    fn layer(name: &str) -> Raster {
        constant_raster(name, fixtures::grid::simple_10x10(), Some(fixtures::crs::UTM33N), 1.0)
    }

    #[test]
    fn test_nested_order_preserved() {
        let inputs = vec![
            layer("a").into(),
            RasterOrOther::Collection(vec![
                layer("b").into(),
                RasterOrOther::other("log"),
                RasterOrOther::Collection(vec![layer("c").into()]),
            ]),
            layer("d").into(),
        ];
        let flat = flatten_inputs(inputs).unwrap();
        assert_eq!(flat.discarded, vec!["log"]);
        let names: Vec<String> = flat
            .rasters
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(flatten_inputs(vec![]), Err(CovariateError::EmptyInput)));
    }

    #[test]
    fn test_no_rasters() {
        let inputs = vec![
            RasterOrOther::other("a"),
            RasterOrOther::Collection(vec![RasterOrOther::other("b")]),
        ];
        assert!(matches!(flatten_inputs(inputs), Err(CovariateError::NoValidLayers(2))));
    }

    #[test]
    fn test_nested_empty_collections_are_empty_input() {
        let inputs = vec![RasterOrOther::Collection(vec![RasterOrOther::Collection(vec![])])];
        assert!(matches!(flatten_inputs(inputs), Err(CovariateError::EmptyInput)));
    }
}
