//! Coordinate Reference System types and utilities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known CRS codes supported by the covariate pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// NAD83 Geographic (treated as WGS84; sub-meter datum shift ignored)
    Epsg4269,
    /// Web Mercator (meters)
    Epsg3857,
    /// WGS84 / UTM zone (meters). EPSG:326xx north, EPSG:327xx south.
    Utm { zone: u8, north: bool },
}

impl CrsCode {
    /// Parse a CRS identifier.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326"
    /// - "epsg:32633"
    /// - "CRS:84" (equivalent to EPSG:4326 with lon/lat axis order)
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" | "WGS84" => return Ok(CrsCode::Epsg4326),
            "EPSG:4269" => return Ok(CrsCode::Epsg4269),
            "EPSG:3857" | "EPSG:900913" => return Ok(CrsCode::Epsg3857),
            _ => {}
        }

        let code: u32 = normalized
            .strip_prefix("EPSG:")
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| CrsParseError::UnsupportedCrs(s.to_string()))?;

        match code {
            32601..=32660 => Ok(CrsCode::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(CrsCode::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// UTM zone containing a WGS84 longitude/latitude.
    pub fn utm_for_lonlat(lon: f64, lat: f64) -> Self {
        let zone = (((lon + 180.0) / 6.0).floor() as i32).rem_euclid(60) + 1;
        CrsCode::Utm {
            zone: zone as u8,
            north: lat >= 0.0,
        }
    }

    /// Numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg4269 => 4269,
            CrsCode::Epsg3857 => 3857,
            CrsCode::Utm { zone, north: true } => 32600 + *zone as u32,
            CrsCode::Utm { zone, north: false } => 32700 + *zone as u32,
        }
    }

    /// Check if this is a geographic (lon/lat) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326 | CrsCode::Epsg4269)
    }

    /// Check if this CRS uses planar (projected) units.
    pub fn is_projected(&self) -> bool {
        !self.is_geographic()
    }

    /// Two codes describe the same coordinate space.
    ///
    /// The geographic codes are interchangeable at raster resolution.
    pub fn same_space(&self, other: &CrsCode) -> bool {
        self == other || (self.is_geographic() && other.is_geographic())
    }

    /// Get the valid bounds for this CRS, in its own units.
    pub fn valid_bounds(&self) -> crate::BoundingBox {
        use crate::BoundingBox;

        match self {
            CrsCode::Epsg4326 | CrsCode::Epsg4269 => BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
            CrsCode::Epsg3857 => {
                // Web Mercator bounds (approx ±85.06° latitude)
                let max_extent = 20037508.342789244;
                BoundingBox::new(-max_extent, -max_extent, max_extent, max_extent)
            }
            CrsCode::Utm { north, .. } => {
                // False easting 500 km; southern zones use a 10,000 km false northing
                if *north {
                    BoundingBox::new(100_000.0, 0.0, 900_000.0, 9_400_000.0)
                } else {
                    BoundingBox::new(100_000.0, 1_000_000.0, 900_000.0, 10_000_000.0)
                }
            }
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl TryFrom<String> for CrsCode {
    type Error = CrsParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CrsCode::parse(&value)
    }
}

impl From<CrsCode> for String {
    fn from(code: CrsCode) -> Self {
        code.to_string()
    }
}

impl std::str::FromStr for CrsCode {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrsCode::parse(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}
