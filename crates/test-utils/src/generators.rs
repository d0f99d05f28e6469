//! Test data generators for creating synthetic covariate rasters.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

use covariate_common::{Band, CrsCode, GridSpec, Raster};

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// This makes it easy to verify that data is being read/written correctly
/// by checking that grid[row][col] == col * 1000 + row.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50); // 10 * 5
/// assert_eq!(grid[0], 0.0);   // col=0, row=0 -> 0*1000 + 0
/// assert_eq!(grid[1], 1000.0); // col=1, row=0 -> 1*1000 + 0
/// assert_eq!(grid[10], 1.0);  // col=0, row=1 -> 0*1000 + 1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates an elevation-like surface: a tilted plane plus a smooth bump.
///
/// Values stay in roughly 100-600 m and vary in both directions, so slope
/// and aspect derivatives are non-trivial.
pub fn create_elevation_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let r2 = (cx * cx + cy * cy).max(1.0);
    for row in 0..height {
        for col in 0..width {
            let plane = 100.0 + 2.0 * col as f32 + 1.0 * row as f32;
            let dx = col as f32 - cx;
            let dy = row as f32 - cy;
            let bump = 300.0 * (-(dx * dx + dy * dy) / (0.25 * r2)).exp();
            data.push(plane + bump);
        }
    }
    data
}

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a grid with NaN values at specified positions.
///
/// # Arguments
///
/// * `width` - Number of columns
/// * `height` - Number of rows
/// * `nan_positions` - List of (col, row) positions that should be NaN
///
/// # Returns
///
/// A `Vec<f32>` holding the `create_test_grid` pattern with NaN at the
/// specified positions.
pub fn create_grid_with_nans(
    width: usize,
    height: usize,
    nan_positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = create_test_grid(width, height);
    for &(col, row) in nan_positions {
        if col < width && row < height {
            data[row * width + col] = f32::NAN;
        }
    }
    data
}

/// Single-band raster over `grid` filled with the `create_test_grid` pattern.
pub fn ramp_raster(name: &str, grid: GridSpec, crs: Option<CrsCode>) -> Raster {
    Raster {
        grid,
        crs,
        bands: vec![Band::new(name, create_test_grid(grid.nx, grid.ny))],
    }
}

/// Single-band raster whose value at each cell is a linear function of the
/// cell-center coordinates: `a * x + b * y + c`.
///
/// Linear fields survive bilinear resampling exactly, which makes them
/// useful for checking interpolation.
pub fn linear_raster(
    name: &str,
    grid: GridSpec,
    crs: Option<CrsCode>,
    a: f64,
    b: f64,
    c: f64,
) -> Raster {
    let mut data = Vec::with_capacity(grid.len());
    for row in 0..grid.ny {
        for col in 0..grid.nx {
            let (x, y) = grid.cell_center(col, row);
            data.push((a * x + b * y + c) as f32);
        }
    }
    Raster {
        grid,
        crs,
        bands: vec![Band::new(name, data)],
    }
}

/// Single-band constant raster.
pub fn constant_raster(name: &str, grid: GridSpec, crs: Option<CrsCode>, value: f32) -> Raster {
    Raster::filled(name, grid, crs, value)
}

/// Elevation-like raster for reference grids and terrain inputs.
pub fn elevation_raster(grid: GridSpec, crs: Option<CrsCode>) -> Raster {
    Raster {
        grid,
        crs,
        bands: vec![Band::new("elevation", create_elevation_grid(grid.nx, grid.ny))],
    }
}
