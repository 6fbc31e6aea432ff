//! Point and segment value types.

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::core::tolerance::DEGENERATE_SEGMENT;

/// A point (or vector) in 3D space.
///
/// Serialized as a plain `[x, y, z]` array so streamline batches stay compact.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const ORIGIN: Point3 = Point3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Point3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Point3) -> Point3 {
        Point3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Point3) -> f64 {
        (self - other).norm()
    }

    /// Linear interpolation: `t = 0` yields `self`, `t = 1` yields `other`.
    pub fn lerp(self, other: Point3, t: f64) -> Point3 {
        self + (other - self) * t
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Point3 {
    fn from(value: [f64; 3]) -> Self {
        Point3::new(value[0], value[1], value[2])
    }
}

impl From<Point3> for [f64; 3] {
    fn from(value: Point3) -> Self {
        value.to_array()
    }
}

impl Add for Point3 {
    type Output = Point3;

    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Point3;

    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point3 {
    type Output = Point3;

    fn mul(self, rhs: f64) -> Point3 {
        Point3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Point3 {
    type Output = Point3;

    fn neg(self) -> Point3 {
        Point3::new(-self.x, -self.y, -self.z)
    }
}

/// Straight piece of a streamline under test.
///
/// Always derived from `end - beg`; never mutated in place. Truncation and
/// sub-segment extraction return new values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub beg: Point3,
    pub end: Point3,
    /// Unit direction, or zero for a degenerate segment.
    pub dir: Point3,
    pub len: f64,
}

impl LineSegment {
    pub fn new(beg: Point3, end: Point3) -> Self {
        let delta = end - beg;
        let len = delta.norm();
        let dir = if len > DEGENERATE_SEGMENT {
            delta * (1.0 / len)
        } else {
            Point3::ORIGIN
        };
        Self { beg, end, dir, len }
    }

    pub fn is_degenerate(&self) -> bool {
        self.len <= DEGENERATE_SEGMENT
    }

    /// Point at `distance` from `beg`, clamped to the segment.
    pub fn point_at(&self, distance: f64) -> Point3 {
        if self.is_degenerate() {
            return self.beg;
        }
        self.beg + self.dir * distance.clamp(0.0, self.len)
    }

    /// Point at `distance` along the segment's line, past either end when
    /// `distance` falls outside `[0, len]`.
    pub fn extended_point(&self, distance: f64) -> Point3 {
        self.beg + self.dir * distance
    }

    /// Sub-segment covering `[from, to]` distances (clamped).
    pub fn sub(&self, from: f64, to: f64) -> LineSegment {
        LineSegment::new(self.point_at(from), self.point_at(to))
    }
}

/// Position where a segment crosses a region boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Distance from the segment start, in `[0, len]`.
    pub distance: f64,
    /// Same position as a fraction of the segment, in `[0, 1]`.
    pub fraction: f64,
}

impl Crossing {
    pub fn at_distance(segment: &LineSegment, distance: f64) -> Self {
        let distance = distance.clamp(0.0, segment.len.max(0.0));
        let fraction = if segment.is_degenerate() {
            0.0
        } else {
            (distance / segment.len).clamp(0.0, 1.0)
        };
        Self { distance, fraction }
    }

    pub fn at_start() -> Self {
        Self {
            distance: 0.0,
            fraction: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_derives_direction_and_length() {
        let seg = LineSegment::new(Point3::new(1.0, 0.0, 0.0), Point3::new(1.0, 4.0, 0.0));
        assert!((seg.len - 4.0).abs() < 1e-12);
        assert_eq!(seg.dir, Point3::new(0.0, 1.0, 0.0));
        assert_eq!(seg.point_at(10.0), seg.end);
    }

    #[test]
    fn degenerate_segment_has_zero_direction() {
        let p = Point3::new(2.0, 2.0, 2.0);
        let seg = LineSegment::new(p, p);
        assert!(seg.is_degenerate());
        assert_eq!(seg.dir, Point3::ORIGIN);
        assert_eq!(seg.point_at(1.0), p);
    }

    #[test]
    fn crossing_clamps_distance_and_fraction() {
        let seg = LineSegment::new(Point3::ORIGIN, Point3::new(2.0, 0.0, 0.0));
        let crossing = Crossing::at_distance(&seg, 3.0);
        assert_eq!(crossing.distance, 2.0);
        assert_eq!(crossing.fraction, 1.0);
        let crossing = Crossing::at_distance(&seg, 0.5);
        assert!((crossing.fraction - 0.25).abs() < 1e-12);
    }

    #[test]
    fn point_serializes_as_array() {
        let json = serde_json::to_string(&Point3::new(1.0, 2.5, -3.0)).expect("serialize");
        assert_eq!(json, "[1.0,2.5,-3.0]");
        let back: Point3 = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Point3::new(1.0, 2.5, -3.0));
    }
}
