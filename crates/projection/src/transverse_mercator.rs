//! Transverse Mercator projection on the WGS84 ellipsoid.
//!
//! Used for the UTM zones that reference grids are delivered in.
//! Implements Krüger's series to third order in the third flattening `n`,
//! which keeps errors well below a millimetre inside a 6° zone.
//!
//! The projection parameters include:
//! - Central meridian (lon0)
//! - Scale factor on the central meridian (k0, 0.9996 for UTM)
//! - False easting / northing (500 km / 0 or 10,000 km for UTM)

use std::f64::consts::PI;

/// WGS84 semi-major axis (meters)
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Largest longitude offset from the central meridian (degrees) that
/// [`TransverseMercator::forward`] accepts. The series diverges well
/// before the 90° singularity.
pub const MAX_CENTRAL_OFFSET: f64 = 20.0;

/// Transverse Mercator projection parameters.
#[derive(Debug, Clone)]
pub struct TransverseMercator {
    /// Central meridian in radians
    pub lon0: f64,
    /// Scale factor on the central meridian
    pub k0: f64,
    /// False easting (meters)
    pub false_easting: f64,
    /// False northing (meters)
    pub false_northing: f64,
    /// Rectifying radius times k0
    k0_a: f64,
    /// First eccentricity
    e: f64,
    alpha: [f64; 3],
    beta: [f64; 3],
    delta: [f64; 3],
}

impl TransverseMercator {
    /// Create a projection on WGS84 with explicit parameters.
    pub fn new(lon0_deg: f64, k0: f64, false_easting: f64, false_northing: f64) -> Self {
        let n = WGS84_F / (2.0 - WGS84_F);
        let n2 = n * n;
        let n3 = n2 * n;

        let rectifying = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);

        Self {
            lon0: lon0_deg.to_radians(),
            k0,
            false_easting,
            false_northing,
            k0_a: k0 * rectifying,
            e: 2.0 * n.sqrt() / (1.0 + n),
            alpha: [
                n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
                13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
                61.0 * n3 / 240.0,
            ],
            beta: [
                n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0,
                n2 / 48.0 + n3 / 15.0,
                17.0 * n3 / 480.0,
            ],
            delta: [
                2.0 * n - 2.0 * n2 / 3.0 - 2.0 * n3,
                7.0 * n2 / 3.0 - 8.0 * n3 / 5.0,
                56.0 * n3 / 15.0,
            ],
        }
    }

    /// Standard UTM zone (1-60), northern or southern hemisphere.
    pub fn utm(zone: u8, north: bool) -> Self {
        let lon0 = zone as f64 * 6.0 - 183.0;
        let false_northing = if north { 0.0 } else { 10_000_000.0 };
        Self::new(lon0, 0.9996, 500_000.0, false_northing)
    }

    /// Convert geographic coordinates (degrees) to easting/northing (meters).
    ///
    /// Returns `None` more than [`MAX_CENTRAL_OFFSET`] degrees of longitude
    /// away from the central meridian.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> Option<(f64, f64)> {
        let lat = lat_deg.to_radians();
        let mut dlon = lon_deg.to_radians() - self.lon0;
        while dlon > PI {
            dlon -= 2.0 * PI;
        }
        while dlon < -PI {
            dlon += 2.0 * PI;
        }
        if !(dlon.abs() <= MAX_CENTRAL_OFFSET.to_radians()) {
            return None;
        }

        let sin_lat = lat.sin();
        let t = (sin_lat.atanh() - self.e * (self.e * sin_lat).atanh()).sinh();
        let xi_p = t.atan2(dlon.cos());
        let eta_p = (dlon.sin() / (1.0 + t * t).sqrt()).atanh();

        let mut xi = xi_p;
        let mut eta = eta_p;
        for (j, a) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi += a * (k * xi_p).sin() * (k * eta_p).cosh();
            eta += a * (k * xi_p).cos() * (k * eta_p).sinh();
        }

        Some((
            self.false_easting + self.k0_a * eta,
            self.false_northing + self.k0_a * xi,
        ))
    }

    /// Convert easting/northing (meters) to geographic coordinates (degrees).
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let xi = (y - self.false_northing) / self.k0_a;
        let eta = (x - self.false_easting) / self.k0_a;

        let mut xi_p = xi;
        let mut eta_p = eta;
        for (j, b) in self.beta.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi_p -= b * (k * xi).sin() * (k * eta).cosh();
            eta_p -= b * (k * xi).cos() * (k * eta).sinh();
        }

        let chi = (xi_p.sin() / eta_p.cosh()).asin();
        let mut lat = chi;
        for (j, d) in self.delta.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            lat += d * (k * chi).sin();
        }

        let lon = self.lon0 + eta_p.sinh().atan2(xi_p.cos());

        (lon.to_degrees(), lat.to_degrees())
    }
}
