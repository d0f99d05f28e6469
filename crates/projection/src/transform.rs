//! Point and extent transforms between the supported CRS codes.
//!
//! Every transform pivots through WGS84 longitude/latitude.

use covariate_common::{BoundingBox, CovResult, CovariateError, CrsCode};

use crate::mercator;
use crate::transverse_mercator::TransverseMercator;

/// A single CRS's conversion to and from WGS84 lon/lat.
#[derive(Debug, Clone)]
enum Projector {
    Geographic,
    WebMercator,
    Tm(TransverseMercator),
}

impl Projector {
    fn for_crs(crs: CrsCode) -> Self {
        match crs {
            CrsCode::Epsg4326 | CrsCode::Epsg4269 => Projector::Geographic,
            CrsCode::Epsg3857 => Projector::WebMercator,
            CrsCode::Utm { zone, north } => Projector::Tm(TransverseMercator::utm(zone, north)),
        }
    }

    fn to_lonlat(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Projector::Geographic => (x, y),
            Projector::WebMercator => mercator::inverse(x, y),
            Projector::Tm(tm) => tm.inverse(x, y),
        }
    }

    fn from_lonlat(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        match self {
            Projector::Geographic => Some((lon, lat)),
            Projector::WebMercator => Some(mercator::forward(lon, lat)),
            Projector::Tm(tm) => tm.forward(lon, lat),
        }
    }
}

/// Reusable transform from one CRS to another.
#[derive(Debug, Clone)]
pub struct CrsTransform {
    from: CrsCode,
    to: CrsCode,
    src: Projector,
    dst: Projector,
}

impl CrsTransform {
    pub fn new(from: CrsCode, to: CrsCode) -> Self {
        Self {
            from,
            to,
            src: Projector::for_crs(from),
            dst: Projector::for_crs(to),
        }
    }

    pub fn source(&self) -> CrsCode {
        self.from
    }

    pub fn target(&self) -> CrsCode {
        self.to
    }

    /// True when source and target describe the same coordinate space.
    pub fn is_identity(&self) -> bool {
        self.from.same_space(&self.to)
    }

    /// Transform one point. Returns None when the point falls outside the
    /// domain of either projection.
    pub fn transform(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if self.is_identity() {
            return Some((x, y));
        }

        let (lon, lat) = self.src.to_lonlat(x, y);
        if !lon.is_finite() || !lat.is_finite() || lat.abs() > 90.0 {
            return None;
        }

        let (tx, ty) = self.dst.from_lonlat(lon, lat)?;
        if tx.is_finite() && ty.is_finite() {
            Some((tx, ty))
        } else {
            None
        }
    }

    /// Transform an extent by sampling a `densify` x `densify` lattice over
    /// it (edges and corners included) and taking the enclosing box, clamped
    /// to the target's valid bounds.
    ///
    /// Points outside the domain of either projection are skipped, so a
    /// global extent maps onto the part the target CRS can represent.
    pub fn transform_bbox(&self, bbox: &BoundingBox, densify: usize) -> CovResult<BoundingBox> {
        if self.is_identity() {
            return Ok(*bbox);
        }

        let steps = densify.max(1);
        let lattice = (0..=steps).flat_map(|i| {
            let y = bbox.min_y + i as f64 / steps as f64 * bbox.height();
            (0..=steps).map(move |j| (bbox.min_x + j as f64 / steps as f64 * bbox.width(), y))
        });

        let projected = lattice.filter_map(|(x, y)| self.transform(x, y));
        BoundingBox::from_points(projected)
            .and_then(|extent| extent.intersection(&self.to.valid_bounds()))
            .ok_or_else(|| {
                CovariateError::Projection(format!(
                    "extent {:?} has no valid points in {} when transformed from {}",
                    bbox, self.to, self.from
                ))
            })
    }
}

/// One-shot point transform.
pub fn transform_point(from: CrsCode, to: CrsCode, x: f64, y: f64) -> Option<(f64, f64)> {
    CrsTransform::new(from, to).transform(x, y)
}

/// One-shot extent transform with 20 samples per edge.
pub fn transform_bbox(from: CrsCode, to: CrsCode, bbox: &BoundingBox) -> CovResult<BoundingBox> {
    CrsTransform::new(from, to).transform_bbox(bbox, 20)
}
