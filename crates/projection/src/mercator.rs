//! Spherical Web Mercator (EPSG:3857).

use std::f64::consts::PI;

use crate::transverse_mercator::WGS84_A;

/// Latitude limit of the square Web Mercator world (degrees).
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Convert lon/lat (degrees) to Web Mercator meters. Latitudes are clamped
/// to the projection's square extent.
pub fn forward(lon_deg: f64, lat_deg: f64) -> (f64, f64) {
    let lat = lat_deg.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = WGS84_A * lon_deg.to_radians();
    let y = WGS84_A * (PI / 4.0 + lat / 2.0).tan().ln();
    (x, y)
}

/// Convert Web Mercator meters to lon/lat (degrees).
pub fn inverse(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WGS84_A).to_degrees();
    let lat = (2.0 * (y / WGS84_A).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::assert_coords_approx_eq;

    #[test]
    fn test_world_extent() {
        let (x, y) = forward(180.0, MAX_LATITUDE);
        assert_coords_approx_eq!((x, y), (20_037_508.342_789_244, 20_037_508.342_789_244), 1e-3);
    }

    #[test]
    fn test_roundtrip() {
        let (x, y) = forward(-97.5, 38.5);
        let (lon, lat) = inverse(x, y);
        assert_coords_approx_eq!((lon, lat), (-97.5, 38.5), 1e-9);
    }
}
