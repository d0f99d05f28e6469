//! Interpolation kernels for raster resampling.
//!
//! Kernels take fractional pixel coordinates in which integer values fall on
//! cell centers (see `GridSpec::fractional_index`). Points more than half a
//! cell outside the source grid sample as `NaN`.

use crate::types::ResampleMethod;

/// Fractions closer than this to a cell center are snapped onto it so that
/// grids sharing cell centers copy values exactly.
const SNAP_EPSILON: f64 = 1e-9;

fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_EPSILON {
        r
    } else {
        v
    }
}

#[inline]
fn in_coverage(width: usize, height: usize, x: f64, y: f64) -> bool {
    x >= -0.5 && y >= -0.5 && x < width as f64 - 0.5 && y < height as f64 - 0.5
}

/// Sample `data` at (x, y) with the given method.
pub fn interpolate(
    method: ResampleMethod,
    data: &[f32],
    width: usize,
    height: usize,
    x: f64,
    y: f64,
) -> f32 {
    match method {
        ResampleMethod::Nearest => nearest_interpolate(data, width, height, x, y),
        ResampleMethod::Bilinear => bilinear_interpolate(data, width, height, x, y),
        ResampleMethod::Cubic => cubic_interpolate(data, width, height, x, y),
    }
}

/// Nearest neighbor interpolation.
///
/// Returns the value of the cell containing the point.
pub fn nearest_interpolate(
    data: &[f32],
    width: usize,
    height: usize,
    x: f64,
    y: f64,
) -> f32 {
    let (x, y) = (snap(x), snap(y));
    if !in_coverage(width, height, x, y) {
        return f32::NAN;
    }

    // Ties at cell edges go to the lower index.
    let col = ((x + 0.5).ceil() - 1.0).max(0.0) as usize;
    let row = ((y + 0.5).ceil() - 1.0).max(0.0) as usize;

    data[row.min(height - 1) * width + col.min(width - 1)]
}

/// Bilinear interpolation.
///
/// Smoothly interpolates between the four nearest cell centers. Within the
/// outer half cell the edge values are extended.
pub fn bilinear_interpolate(
    data: &[f32],
    width: usize,
    height: usize,
    x: f64,
    y: f64,
) -> f32 {
    let (x, y) = (snap(x), snap(y));
    if !in_coverage(width, height, x, y) {
        return f32::NAN;
    }

    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let xf = (x - x0 as f64) as f32;
    let yf = (y - y0 as f64) as f32;

    let v00 = data[y0 * width + x0];
    if xf == 0.0 && yf == 0.0 {
        return v00;
    }
    let v10 = data[y0 * width + x1];
    let v01 = data[y1 * width + x0];
    let v11 = data[y1 * width + x1];

    // Handle NaN values - if any corner is NaN, return NaN
    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }

    let top = v00 * (1.0 - xf) + v10 * xf;
    let bottom = v01 * (1.0 - xf) + v11 * xf;
    top * (1.0 - yf) + bottom * yf
}

/// Bicubic interpolation.
///
/// Uses 16 surrounding points for smoother interpolation.
pub fn cubic_interpolate(
    data: &[f32],
    width: usize,
    height: usize,
    x: f64,
    y: f64,
) -> f32 {
    let (x, y) = (snap(x), snap(y));
    if !in_coverage(width, height, x, y) {
        return f32::NAN;
    }

    let xi = x.floor() as i64;
    let yi = y.floor() as i64;

    let xf = (x - xi as f64) as f32;
    let yf = (y - yi as f64) as f32;

    if xf == 0.0 && yf == 0.0 {
        let col = xi.clamp(0, width as i64 - 1) as usize;
        let row = yi.clamp(0, height as i64 - 1) as usize;
        return data[row * width + col];
    }

    // Sample 4x4 grid of points
    let mut values = [[0.0f32; 4]; 4];

    for j in 0..4 {
        for i in 0..4 {
            let px = (xi + i - 1).clamp(0, width as i64 - 1) as usize;
            let py = (yi + j - 1).clamp(0, height as i64 - 1) as usize;
            values[j as usize][i as usize] = data[py * width + px];

            // If any value is NaN, fall back to bilinear
            if values[j as usize][i as usize].is_nan() {
                return bilinear_interpolate(data, width, height, x, y);
            }
        }
    }

    // Cubic interpolation along x for each row
    let mut row_values = [0.0f32; 4];
    for j in 0..4 {
        row_values[j] = cubic_1d(values[j][0], values[j][1], values[j][2], values[j][3], xf);
    }

    // Cubic interpolation along y
    cubic_1d(row_values[0], row_values[1], row_values[2], row_values[3], yf)
}

/// 1D cubic interpolation using Catmull-Rom spline.
fn cubic_1d(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;

    // Catmull-Rom coefficients
    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}
