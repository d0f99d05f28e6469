//! In-memory raster layers and the heterogeneous collections producers emit.

use serde::{Deserialize, Serialize};

use crate::{CovResult, CovariateError, CrsCode, GridSpec};

/// One named band of values laid out row-major over the owning raster's grid.
///
/// Missing values are `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub data: Vec<f32>,
}

impl Band {
    pub fn new(name: impl Into<String>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Number of non-missing cells.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }
}

/// A single- or multi-band raster sharing one grid and CRS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    pub grid: GridSpec,
    /// `None` when the producer could not determine the CRS.
    pub crs: Option<CrsCode>,
    pub bands: Vec<Band>,
}

impl Raster {
    /// Build a raster, checking that every band covers the grid.
    pub fn new(grid: GridSpec, crs: Option<CrsCode>, bands: Vec<Band>) -> CovResult<Self> {
        let raster = Self { grid, crs, bands };
        raster.validate()?;
        Ok(raster)
    }

    /// Check that the grid is addressable and every band holds exactly one
    /// value per cell.
    pub fn validate(&self) -> CovResult<()> {
        let cells = self.grid.checked_len().ok_or_else(|| {
            CovariateError::Format(format!(
                "grid {}x{} has more cells than can be addressed",
                self.grid.nx, self.grid.ny
            ))
        })?;
        for band in &self.bands {
            if band.data.len() != cells {
                return Err(CovariateError::Format(format!(
                    "band '{}' has {} values, grid {}x{} needs {}",
                    band.name,
                    band.data.len(),
                    self.grid.nx,
                    self.grid.ny,
                    cells
                )));
            }
        }
        Ok(())
    }

    /// Convenience constructor for a single band.
    pub fn single(
        name: impl Into<String>,
        grid: GridSpec,
        crs: Option<CrsCode>,
        data: Vec<f32>,
    ) -> CovResult<Self> {
        Self::new(grid, crs, vec![Band::new(name, data)])
    }

    /// Raster of one band filled with a constant.
    pub fn filled(name: impl Into<String>, grid: GridSpec, crs: Option<CrsCode>, value: f32) -> Self {
        Self {
            grid,
            crs,
            bands: vec![Band::new(name, vec![value; grid.len()])],
        }
    }

    /// Display name: the first band's name, or `<empty>`.
    pub fn name(&self) -> &str {
        self.bands.first().map(|b| b.name.as_str()).unwrap_or("<empty>")
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Value at (col, row) of band `band`.
    pub fn get(&self, band: usize, col: usize, row: usize) -> Option<f32> {
        if col >= self.grid.nx || row >= self.grid.ny {
            return None;
        }
        self.bands
            .get(band)
            .and_then(|b| b.data.get(self.grid.flat_index(col, row)).copied())
    }

    /// Rename the first band (single-band producers use this after
    /// deriving a layer from an input).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        if let Some(band) = self.bands.first_mut() {
            band.name = name.into();
        }
        self
    }
}

/// What a producer hands to the alignment engine.
///
/// Producers return bundles mixing rasters, nested lists of rasters and
/// metadata. Only `Raster` elements survive flattening.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterOrOther {
    Raster(Raster),
    Collection(Vec<RasterOrOther>),
    /// Non-raster payload (scene metadata, tool logs, ...), described by a label.
    Other(String),
}

impl RasterOrOther {
    pub fn other(label: impl Into<String>) -> Self {
        Self::Other(label.into())
    }

    pub fn is_raster(&self) -> bool {
        matches!(self, Self::Raster(_))
    }
}

impl From<Raster> for RasterOrOther {
    fn from(raster: Raster) -> Self {
        Self::Raster(raster)
    }
}

impl From<Vec<Raster>> for RasterOrOther {
    fn from(rasters: Vec<Raster>) -> Self {
        Self::Collection(rasters.into_iter().map(Self::Raster).collect())
    }
}

impl From<Vec<RasterOrOther>> for RasterOrOther {
    fn from(items: Vec<RasterOrOther>) -> Self {
        Self::Collection(items)
    }
}
