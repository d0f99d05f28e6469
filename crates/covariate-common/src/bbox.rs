//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// A geographic or projected bounding box.
///
/// For geographic CRS (EPSG:4326), coordinates are in degrees.
/// For projected CRS (UTM, EPSG:3857), coordinates are in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box enclosing all points. Returns None for an empty iterator
    /// or when every point is non-finite.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut bbox: Option<Self> = None;
        for (x, y) in points {
            if !x.is_finite() || !y.is_finite() {
                continue;
            }
            bbox = Some(match bbox {
                None => Self::new(x, y, x, y),
                Some(b) => Self::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y)),
            });
        }
        bbox
    }

    /// Parse a "minx,miny,maxx,maxy" string.
    pub fn parse(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let mut values = [0.0f64; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))?;
        }

        Ok(Self::new(values[0], values[1], values[2], values[3]))
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Center point (x, y).
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Expand by a buffer on every side.
    pub fn expand(&self, buffer: f64) -> Self {
        Self::new(
            self.min_x - buffer,
            self.min_y - buffer,
            self.max_x + buffer,
            self.max_y + buffer,
        )
    }

    /// Check if this bbox intersects another.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// Compute the intersection of two bounding boxes.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }

        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Check whether another box lies entirely inside this one.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Approximate equality, with tolerance in coordinate units.
    pub fn approx_eq(&self, other: &BoundingBox, tolerance: f64) -> bool {
        (self.min_x - other.min_x).abs() <= tolerance
            && (self.min_y - other.min_y).abs() <= tolerance
            && (self.max_x - other.max_x).abs() <= tolerance
            && (self.max_y - other.max_y).abs() <= tolerance
    }

    /// Generate a cache key fragment for this bbox (quantized to avoid floating point issues).
    pub fn cache_key(&self) -> String {
        format!(
            "{:.6}_{:.6}_{:.6}_{:.6}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid BBOX format: {0}. Expected 'minx,miny,maxx,maxy'")]
    InvalidFormat(String),

    #[error("Invalid number in BBOX: {0}")]
    InvalidNumber(String),
}
