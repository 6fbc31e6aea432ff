//! Analytic spherical region.

use crate::core::geometry::{Crossing, LineSegment, Point3};
use crate::core::region::{Region, RegionError, RegionKind};

/// Closed ball; points on the boundary count as inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    center: Point3,
    radius: f64,
}

impl Sphere {
    pub fn new(center: Point3, radius: f64) -> Result<Self, RegionError> {
        if !center.is_finite() || !radius.is_finite() {
            return Err(RegionError::NonFinite { what: "sphere" });
        }
        if radius < 0.0 {
            return Err(RegionError::NegativeRadius { radius });
        }
        Ok(Self { center, radius })
    }

    pub fn center(&self) -> Point3 {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Registry key: `sphere:x,y,z,r` with shortest round-trip formatting.
    pub fn canonical_key(center: Point3, radius: f64) -> String {
        format!("sphere:{},{},{},{}", center.x, center.y, center.z, radius)
    }

    /// Roots of `|beg + t*dir - c|^2 = r^2` for a non-degenerate segment, plus
    /// the signed "outside-ness" `|beg - c|^2 - r^2` of the start point.
    fn intersect(&self, segment: &LineSegment) -> (f64, Option<(f64, f64)>) {
        let offset = segment.beg - self.center;
        let c = offset.dot(offset) - self.radius * self.radius;
        let b = offset.dot(segment.dir);
        let disc = b * b - c;
        if segment.is_degenerate() || disc < 0.0 {
            return (c, None);
        }
        let root = disc.sqrt();
        (c, Some((-b - root, -b + root)))
    }
}

impl Region for Sphere {
    fn kind(&self) -> RegionKind {
        RegionKind::Sphere
    }

    fn is_inside(&self, point: Point3) -> bool {
        point.distance(self.center) <= self.radius
    }

    fn is_near_boundary(&self, point: Point3, threshold: f64) -> bool {
        (point.distance(self.center) - self.radius).abs() <= threshold
    }

    fn entering(&self, segment: &LineSegment) -> Option<Crossing> {
        let (c, roots) = self.intersect(segment);
        if c <= 0.0 {
            return Some(Crossing::at_start());
        }
        let (near, _) = roots?;
        // With the start outside both roots share a sign; negative means the
        // sphere lies behind the segment.
        (near >= 0.0 && near <= segment.len).then(|| Crossing::at_distance(segment, near))
    }

    fn exiting(&self, segment: &LineSegment) -> Option<Crossing> {
        let (c, roots) = self.intersect(segment);
        if c > 0.0 {
            return Some(Crossing::at_start());
        }
        let (_, far) = roots?;
        (far <= segment.len).then(|| Crossing::at_distance(segment, far.max(0.0)))
    }
}
