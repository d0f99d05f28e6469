//! Pixel grid specifications for covariate rasters.

use crate::BoundingBox;
use serde::{Deserialize, Serialize};

/// Relative tolerance (fraction of a pixel) under which two grids are treated
/// as the same grid.
pub const GRID_TOLERANCE: f64 = 1e-6;

/// Specification of a regular, north-up raster grid.
///
/// Cells are areas: `origin_x`/`origin_y` is the north-west corner of cell
/// (0, 0), columns run west to east and rows run north to south.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of columns
    pub nx: usize,
    /// Number of rows
    pub ny: usize,
    /// Cell width (degrees or meters depending on CRS)
    pub dx: f64,
    /// Cell height, positive
    pub dy: f64,
    /// West edge of the grid
    pub origin_x: f64,
    /// North edge of the grid
    pub origin_y: f64,
}

impl GridSpec {
    /// Create a new grid specification.
    pub fn new(nx: usize, ny: usize, dx: f64, dy: f64, origin_x: f64, origin_y: f64) -> Self {
        Self {
            nx,
            ny,
            dx,
            dy,
            origin_x,
            origin_y,
        }
    }

    /// Grid covering `bbox` with the given cell counts.
    pub fn from_bbox(bbox: &BoundingBox, nx: usize, ny: usize) -> Self {
        Self::new(
            nx,
            ny,
            bbox.width() / nx.max(1) as f64,
            bbox.height() / ny.max(1) as f64,
            bbox.min_x,
            bbox.max_y,
        )
    }

    /// Grid covering `bbox` at (approximately) the given resolution. The
    /// extent grows to a whole number of cells.
    pub fn from_resolution(bbox: &BoundingBox, dx: f64, dy: f64) -> Self {
        let nx = ((bbox.width() / dx) - GRID_TOLERANCE).ceil().max(1.0) as usize;
        let ny = ((bbox.height() / dy) - GRID_TOLERANCE).ceil().max(1.0) as usize;
        Self::new(nx, ny, dx, dy, bbox.min_x, bbox.max_y)
    }

    /// Calculate the bounding box (outer cell edges) of this grid.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox {
            min_x: self.origin_x,
            min_y: self.origin_y - self.ny as f64 * self.dy,
            max_x: self.origin_x + self.nx as f64 * self.dx,
            max_y: self.origin_y,
        }
    }

    /// Resolution as (dx, dy).
    pub fn resolution(&self) -> (f64, f64) {
        (self.dx, self.dy)
    }

    /// Coordinates of the center of cell (col, row).
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.dx,
            self.origin_y - (row as f64 + 0.5) * self.dy,
        )
    }

    /// Fractional pixel coordinates of a point, where integer values land on
    /// cell centers. Suitable for the interpolation kernels.
    pub fn fractional_index(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.dx - 0.5,
            (self.origin_y - y) / self.dy - 0.5,
        )
    }

    /// Convert coordinates to the index of the containing cell.
    pub fn coord_to_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.origin_x) / self.dx).floor();
        let row = ((self.origin_y - y) / self.dy).floor();

        if col < 0.0 || row < 0.0 || col >= self.nx as f64 || row >= self.ny as f64 {
            return None;
        }

        Some((col as usize, row as usize))
    }

    /// Get the 1D array index for a 2D grid position.
    pub fn flat_index(&self, col: usize, row: usize) -> usize {
        row * self.nx + col
    }

    /// Total number of grid cells, saturating at `usize::MAX`.
    pub fn len(&self) -> usize {
        self.nx.saturating_mul(self.ny)
    }

    /// Total number of grid cells, `None` when it does not fit in a `usize`.
    pub fn checked_len(&self) -> Option<usize> {
        self.nx.checked_mul(self.ny)
    }

    /// Check if grid is empty.
    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }

    /// Same dimensions, and origin/resolution equal to within
    /// [`GRID_TOLERANCE`] of a cell.
    pub fn same_grid(&self, other: &GridSpec) -> bool {
        if self.nx != other.nx || self.ny != other.ny {
            return false;
        }
        let tol_x = self.dx.abs() * GRID_TOLERANCE;
        let tol_y = self.dy.abs() * GRID_TOLERANCE;
        (self.dx - other.dx).abs() <= tol_x / self.nx.max(1) as f64
            && (self.dy - other.dy).abs() <= tol_y / self.ny.max(1) as f64
            && (self.origin_x - other.origin_x).abs() <= tol_x
            && (self.origin_y - other.origin_y).abs() <= tol_y
    }

    /// Sub-grid of whole cells covering the part of this grid that overlaps
    /// `bbox`, as (col offset, row offset, grid). Cell edges snap outward.
    pub fn window(&self, bbox: &BoundingBox) -> Option<(usize, usize, GridSpec)> {
        let overlap = self.bbox().intersection(bbox)?;

        let snap = |v: f64| {
            let r = v.round();
            if (v - r).abs() < GRID_TOLERANCE {
                r
            } else {
                v
            }
        };

        let col0 = snap((overlap.min_x - self.origin_x) / self.dx).floor().max(0.0) as usize;
        let col1 = (snap((overlap.max_x - self.origin_x) / self.dx).ceil() as usize).min(self.nx);
        let row0 = snap((self.origin_y - overlap.max_y) / self.dy).floor().max(0.0) as usize;
        let row1 = (snap((self.origin_y - overlap.min_y) / self.dy).ceil() as usize).min(self.ny);

        if col1 <= col0 || row1 <= row0 {
            return None;
        }

        Some((
            col0,
            row0,
            GridSpec::new(
                col1 - col0,
                row1 - row0,
                self.dx,
                self.dy,
                self.origin_x + col0 as f64 * self.dx,
                self.origin_y - row0 as f64 * self.dy,
            ),
        ))
    }
}
