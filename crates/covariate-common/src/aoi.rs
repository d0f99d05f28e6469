//! Area-of-interest geometries supplied by the caller.

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, CrsCode};

/// A closed ring of (x, y) vertices. The closing vertex may be repeated.
pub type Ring = Vec<(f64, f64)>;

/// Geometry of an area of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point((f64, f64)),
    LineString(Vec<(f64, f64)>),
    /// Exterior ring followed by holes.
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
}

impl Geometry {
    pub fn is_polygonal(&self) -> bool {
        matches!(self, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
    }

    /// Every vertex, in order.
    pub fn vertices(&self) -> Vec<(f64, f64)> {
        match self {
            Geometry::Point(p) => vec![*p],
            Geometry::LineString(line) => line.clone(),
            Geometry::Polygon(rings) => rings.iter().flatten().copied().collect(),
            Geometry::MultiPolygon(polys) => polys.iter().flatten().flatten().copied().collect(),
        }
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.vertices())
    }

    /// Point-in-polygon test (even-odd rule, holes honored). Always false for
    /// non-polygonal geometries.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        match self {
            Geometry::Polygon(rings) => polygon_contains(rings, x, y),
            Geometry::MultiPolygon(polys) => polys.iter().any(|p| polygon_contains(p, x, y)),
            _ => false,
        }
    }

    /// Apply a coordinate transform to every vertex.
    pub fn map_coords<F>(&self, mut f: F) -> Geometry
    where
        F: FnMut(f64, f64) -> (f64, f64),
    {
        let mut ring = |r: &Ring| r.iter().map(|&(x, y)| f(x, y)).collect::<Ring>();
        match self {
            Geometry::Point((x, y)) => Geometry::Point(f(*x, *y)),
            Geometry::LineString(line) => Geometry::LineString(ring(line)),
            Geometry::Polygon(rings) => Geometry::Polygon(rings.iter().map(&mut ring).collect()),
            Geometry::MultiPolygon(polys) => Geometry::MultiPolygon(
                polys
                    .iter()
                    .map(|p| p.iter().map(&mut ring).collect())
                    .collect(),
            ),
        }
    }
}

fn polygon_contains(rings: &[Ring], x: f64, y: f64) -> bool {
    let mut inside = false;
    for ring in rings {
        if ring_crossings(ring, x, y) % 2 == 1 {
            inside = !inside;
        }
    }
    inside
}

fn ring_crossings(ring: &Ring, x: f64, y: f64) -> usize {
    let n = ring.len();
    if n < 3 {
        return 0;
    }
    let mut crossings = 0;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            crossings += 1;
        }
        j = i;
    }
    crossings
}

/// Caller-supplied area of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaOfInterest {
    pub geometry: Geometry,
    pub crs: Option<CrsCode>,
}

impl AreaOfInterest {
    pub fn new(geometry: Geometry, crs: Option<CrsCode>) -> Self {
        Self { geometry, crs }
    }

    /// Rectangle polygon over `bbox`.
    pub fn from_bbox(bbox: &BoundingBox, crs: CrsCode) -> Self {
        let ring = vec![
            (bbox.min_x, bbox.min_y),
            (bbox.max_x, bbox.min_y),
            (bbox.max_x, bbox.max_y),
            (bbox.min_x, bbox.max_y),
            (bbox.min_x, bbox.min_y),
        ];
        Self::new(Geometry::Polygon(vec![ring]), Some(crs))
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        self.geometry.bbox()
    }
}
