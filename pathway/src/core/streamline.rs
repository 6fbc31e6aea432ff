//! Polyline helpers over fractional vertex positions.
//!
//! A position `k + f` (with `0 <= f < 1`) denotes the point interpolated between
//! vertex `k` and vertex `k + 1`. All helpers clamp positions to
//! `[0, len - 1]`.

use crate::core::geometry::Point3;
use crate::core::tolerance::VERTEX_SNAP;

/// Ordered polyline of 3D points.
pub type Streamline = Vec<Point3>;

/// Total arc length of the polyline.
pub fn length(points: &[Point3]) -> f64 {
    points.windows(2).map(|pair| pair[0].distance(pair[1])).sum()
}

/// Largest valid position (`len - 1`, or 0 for empty input).
pub fn last_position(points: &[Point3]) -> f64 {
    points.len().saturating_sub(1) as f64
}

/// Interpolated point at a fractional position.
pub fn point_at(points: &[Point3], pos: f64) -> Point3 {
    match points.len() {
        0 => Point3::ORIGIN,
        1 => points[0],
        len => {
            let pos = pos.clamp(0.0, (len - 1) as f64);
            let k = (pos.floor() as usize).min(len - 2);
            points[k].lerp(points[k + 1], pos - k as f64)
        }
    }
}

/// Arc length between two positions (order-insensitive).
pub fn arc_length_between(points: &[Point3], a: f64, b: f64) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let lo = lo.clamp(0.0, last_position(points));
    let hi = hi.clamp(0.0, last_position(points));
    let k_lo = lo.floor() as usize;
    let k_hi = hi.floor() as usize;
    if k_lo == k_hi {
        return point_at(points, lo).distance(point_at(points, hi));
    }
    let mut total = point_at(points, lo).distance(points[k_lo + 1]);
    for k in k_lo + 1..k_hi {
        total += points[k].distance(points[k + 1]);
    }
    total + points[k_hi].distance(point_at(points, hi))
}

/// Position reached after travelling `s` units of arc length from vertex 0.
pub fn position_at_arc_length(points: &[Point3], s: f64) -> f64 {
    if points.len() < 2 || s <= 0.0 {
        return 0.0;
    }
    let mut travelled = 0.0;
    for k in 0..points.len() - 1 {
        let seg = points[k].distance(points[k + 1]);
        if travelled + seg >= s {
            if seg <= 0.0 {
                return k as f64;
            }
            return k as f64 + (s - travelled) / seg;
        }
        travelled += seg;
    }
    last_position(points)
}

/// Position reached after travelling `distance` units of arc length from
/// `pos`, towards the last vertex when `forward`. Negative distances travel
/// the other way; the result is clamped to the streamline.
pub fn offset_position(points: &[Point3], pos: f64, distance: f64, forward: bool) -> f64 {
    let from = arc_length_between(points, 0.0, pos);
    let target = if forward { from + distance } else { from - distance };
    position_at_arc_length(points, target.clamp(0.0, length(points)))
}

/// Snap a position onto a vertex when the interpolated point lies within
/// [`VERTEX_SNAP`] of it.
pub fn snap_position(points: &[Point3], pos: f64) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let pos = pos.clamp(0.0, last_position(points));
    let lower = pos.floor();
    let upper = pos.ceil();
    if lower == upper {
        return pos;
    }
    let p = point_at(points, pos);
    if p.distance(points[lower as usize]) <= VERTEX_SNAP {
        lower
    } else if p.distance(points[upper as usize]) <= VERTEX_SNAP {
        upper
    } else {
        pos
    }
}

/// Vertex made available at a position, either existing or freshly inserted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexAt {
    pub index: usize,
    pub inserted: bool,
}

/// Ensure a vertex exists at `pos`, inserting an interpolated point when the
/// position falls strictly between two vertices.
pub fn ensure_vertex(points: &mut Streamline, pos: f64) -> VertexAt {
    let pos = snap_position(points, pos);
    if pos.fract() == 0.0 {
        return VertexAt {
            index: pos as usize,
            inserted: false,
        };
    }
    let point = point_at(points, pos);
    let index = pos.floor() as usize + 1;
    points.insert(index, point);
    VertexAt {
        index,
        inserted: true,
    }
}

/// Record of an interpolated vertex taken out of a streamline, used to map
/// positions measured with the vertex present onto the original polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemovedVertex {
    pub index: usize,
    /// Where the removed point sat between its neighbours, in `[0, 1]`.
    pub fraction: f64,
}

impl RemovedVertex {
    /// Remove the vertex at `index` (which must have both neighbours).
    pub fn remove(points: &mut Streamline, index: usize) -> Self {
        debug_assert!(index > 0 && index + 1 < points.len());
        let prev = points[index - 1];
        let removed = points[index];
        let next = points[index + 1];
        let span = prev.distance(next);
        let fraction = if span > 0.0 {
            (prev.distance(removed) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        points.remove(index);
        Self { index, fraction }
    }

    /// Map a position from the streamline with the vertex to the one without.
    pub fn map(&self, pos: f64) -> f64 {
        let i = self.index as f64;
        if pos <= i - 1.0 {
            pos
        } else if pos <= i {
            (i - 1.0) + (pos - (i - 1.0)) * self.fraction
        } else if pos <= i + 1.0 {
            (i - 1.0) + self.fraction + (pos - i) * (1.0 - self.fraction)
        } else {
            pos - 1.0
        }
    }
}

/// Cropped copy of the polyline between two positions (inclusive).
///
/// Interior vertices are copied verbatim; each end receives at most one
/// interpolated point.
pub fn crop(points: &[Point3], beg: f64, end: f64) -> Streamline {
    if points.is_empty() {
        return Vec::new();
    }
    let (beg, end) = if beg <= end { (beg, end) } else { (end, beg) };
    let beg = snap_position(points, beg);
    let end = snap_position(points, end);
    let mut out = Vec::with_capacity((end - beg) as usize + 2);
    out.push(point_at(points, beg));
    let first_interior = beg.floor() as usize + 1;
    let last_interior = end.ceil() as usize;
    for k in first_interior..last_interior {
        out.push(points[k]);
    }
    if end > beg {
        out.push(point_at(points, end));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Streamline {
        (0..n).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect()
    }

    #[test]
    fn arc_length_between_fractional_positions() {
        let points = line(5);
        assert!((arc_length_between(&points, 0.5, 3.25) - 2.75).abs() < 1e-12);
        assert!((arc_length_between(&points, 1.2, 1.7) - 0.5).abs() < 1e-12);
        assert!((arc_length_between(&points, 3.0, 1.0) - 2.0).abs() < 1e-12);
        assert!((arc_length_between(&points, 0.0, 4.0) - length(&points)).abs() < 1e-12);
    }

    #[test]
    fn offset_position_carries_across_vertices() {
        let points = vec![
            Point3::ORIGIN,
            Point3::new(0.5, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
        ];
        assert!((offset_position(&points, 0.5, 0.5, true) - 1.5).abs() < 1e-12);
        assert!((offset_position(&points, 2.5, 1.5, false) - 1.0).abs() < 1e-12);
        assert!((offset_position(&points, 1.5, -0.25, true) - 1.0).abs() < 1e-12);
        assert_eq!(offset_position(&points, 2.5, 10.0, true), 3.0);
        assert_eq!(offset_position(&points, 0.5, 10.0, false), 0.0);
    }

    #[test]
    fn position_at_arc_length_inverts_arc_length() {
        let points = vec![
            Point3::ORIGIN,
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 3.0, 0.0),
        ];
        let pos = position_at_arc_length(&points, 3.5);
        assert!((pos - 1.5).abs() < 1e-12);
        assert!((arc_length_between(&points, 0.0, pos) - 3.5).abs() < 1e-12);
    }

    #[test]
    fn ensure_vertex_inserts_once_and_snaps() {
        let mut points = line(3);
        let at = ensure_vertex(&mut points, 0.5);
        assert_eq!(at, VertexAt { index: 1, inserted: true });
        assert_eq!(points.len(), 4);
        assert_eq!(points[1], Point3::new(0.5, 0.0, 0.0));

        let at = ensure_vertex(&mut points, 2.0 + 1e-9);
        assert_eq!(at, VertexAt { index: 2, inserted: false });
        assert_eq!(points.len(), 4);
    }

    #[test]
    fn removed_vertex_maps_positions_back() {
        let mut points = line(3);
        let at = ensure_vertex(&mut points, 0.25);
        let removed = RemovedVertex::remove(&mut points, at.index);
        assert_eq!(points, line(3));
        assert!((removed.map(1.0) - 0.25).abs() < 1e-12);
        assert!((removed.map(0.5) - 0.125).abs() < 1e-12);
        assert!((removed.map(2.0) - 1.0).abs() < 1e-12);
        assert!((removed.map(3.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn crop_keeps_interior_vertices_and_interpolates_ends() {
        let points = line(5);
        let cropped = crop(&points, 0.5, 2.25);
        assert_eq!(
            cropped,
            vec![
                Point3::new(0.5, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(2.25, 0.0, 0.0),
            ]
        );
        assert_eq!(crop(&points, 0.0, 4.0), points);
    }
}
