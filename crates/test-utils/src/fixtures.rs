//! Common test fixtures for covariate-stack tests.
//!
//! This module provides pre-defined grids and extents that represent common
//! scenarios in covariate alignment.

/// Common CRS values for testing.
pub mod crs {
    use covariate_common::CrsCode;

    /// UTM zone 33 north (central Europe)
    pub const UTM33N: CrsCode = CrsCode::Utm { zone: 33, north: true };

    /// UTM zone 32 north, a neighbouring zone to UTM33N
    pub const UTM32N: CrsCode = CrsCode::Utm { zone: 32, north: true };

    /// WGS84 geographic
    pub const WGS84: CrsCode = CrsCode::Epsg4326;

    /// Web Mercator
    pub const WEB_MERCATOR: CrsCode = CrsCode::Epsg3857;
}

/// Common bounding boxes for testing.
pub mod bbox {
    use covariate_common::BoundingBox;

    /// 3 km x 3 km block in UTM 33N around 15E, 52N
    pub const UTM33N_BLOCK: BoundingBox = BoundingBox {
        min_x: 500_010.0,
        min_y: 5_760_000.0,
        max_x: 503_010.0,
        max_y: 5_763_000.0,
    };

    /// Geographic box enclosing `UTM33N_BLOCK` with margin
    pub const WGS84_AROUND_BLOCK: (f64, f64, f64, f64) = (14.95, 51.95, 15.10, 52.05);

    /// Invalid bbox (min > max)
    pub const INVALID: (f64, f64, f64, f64) = (10.0, 10.0, 5.0, 5.0);
}

/// Common grid specifications for testing.
pub mod grid {
    use covariate_common::GridSpec;

    /// 30 m reference grid over `bbox::UTM33N_BLOCK` (100 x 100 cells)
    pub fn utm_30m() -> GridSpec {
        GridSpec::new(100, 100, 30.0, 30.0, 500_010.0, 5_763_000.0)
    }

    /// Small 30 m grid (10 x 8 cells) for fast unit tests
    pub fn utm_30m_small() -> GridSpec {
        GridSpec::new(10, 8, 30.0, 30.0, 500_010.0, 5_763_000.0)
    }

    /// 1 km grid covering the same block plus a margin: coarser, misaligned
    pub fn utm_1km_coarse() -> GridSpec {
        GridSpec::new(6, 6, 1000.0, 1000.0, 499_500.0, 5_764_500.0)
    }

    /// Geographic grid (0.001 degree) covering `bbox::WGS84_AROUND_BLOCK`
    pub fn wgs84_fine() -> GridSpec {
        GridSpec::new(150, 100, 0.001, 0.001, 14.95, 52.05)
    }

    /// Simple 10x10 test grid in arbitrary planar units
    pub fn simple_10x10() -> GridSpec {
        GridSpec::new(10, 10, 1.0, 1.0, 0.0, 10.0)
    }
}

/// Common layer names for testing.
pub mod layers {
    /// Terrain derivative
    pub const SLOPE: &str = "slope";

    /// Bioclimatic annual mean temperature
    pub const BIO01: &str = "bio01";

    /// Sentinel-2 NDVI
    pub const S2_NDVI: &str = "S2_ndvi";

    /// Generic name several producers may pick
    pub const GENERIC_INDEX: &str = "index_1";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utm_grid_matches_block() {
        let g = grid::utm_30m();
        assert_eq!(g.bbox(), bbox::UTM33N_BLOCK);
    }

    #[test]
    fn test_coarse_grid_encloses_block() {
        let g = grid::utm_1km_coarse();
        assert!(g.bbox().contains(&bbox::UTM33N_BLOCK));
    }

    #[test]
    fn test_invalid_bbox_is_invalid() {
        let (min_x, min_y, max_x, max_y) = bbox::INVALID;
        assert!(min_x > max_x);
        assert!(min_y > max_y);
    }
}
