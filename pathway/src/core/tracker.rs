//! Per-rule entry/exit state machine.

use crate::core::geometry::LineSegment;
use crate::core::region::Region;
use crate::core::tolerance::BOUNDARY_PUSH;

/// Upper bound on boundary crossings searched within one segment.
const MAX_CROSSINGS_PER_SEGMENT: usize = 64;

/// Crossing state of one rule along the current walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryStatus {
    /// Walk started outside and has not entered yet.
    #[default]
    NotEnteredYet,
    Entered,
    Exited,
    /// Walk started inside and has not left yet.
    NotExitedYet,
}

impl EntryStatus {
    pub fn initial(inside: bool) -> Self {
        if inside {
            EntryStatus::NotExitedYet
        } else {
            EntryStatus::NotEnteredYet
        }
    }

    pub fn is_inside(self) -> bool {
        matches!(self, EntryStatus::Entered | EntryStatus::NotExitedYet)
    }

    fn after(self, kind: CrossingKind) -> Self {
        match kind {
            CrossingKind::Entry => EntryStatus::Entered,
            CrossingKind::Exit => EntryStatus::Exited,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingKind {
    Entry,
    Exit,
}

/// Boundary event at a distance from the segment start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedCrossing {
    pub kind: CrossingKind,
    pub distance: f64,
}

/// Advance `status` across `segment`, appending every crossing in order.
///
/// Exactly one predicate is queried per (sub-)segment, chosen by the current
/// state. After a crossing the rest of the segment is searched again from just
/// past the boundary, so regions thinner than a segment are still seen.
pub fn track_segment(
    region: &dyn Region,
    status: &mut EntryStatus,
    segment: &LineSegment,
    out: &mut Vec<TrackedCrossing>,
) {
    let mut from = 0.0;
    for _ in 0..MAX_CROSSINGS_PER_SEGMENT {
        let sub = segment.sub(from, segment.len);
        let (kind, found) = if status.is_inside() {
            (CrossingKind::Exit, region.exiting(&sub))
        } else {
            (CrossingKind::Entry, region.entering(&sub))
        };
        let Some(crossing) = found else {
            return;
        };
        let distance = (from + crossing.distance).min(segment.len);
        *status = status.after(kind);
        out.push(TrackedCrossing { kind, distance });
        from = distance + BOUNDARY_PUSH;
        if from >= segment.len {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Point3;
    use crate::core::region::Sphere;

    #[test]
    fn thin_region_yields_entry_and_exit_in_one_segment() {
        let sphere = Sphere::new(Point3::new(5.0, 0.0, 0.0), 0.5).expect("sphere");
        let seg = LineSegment::new(Point3::ORIGIN, Point3::new(10.0, 0.0, 0.0));
        let mut status = EntryStatus::initial(false);
        let mut out = Vec::new();
        track_segment(&sphere, &mut status, &seg, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, CrossingKind::Entry);
        assert!((out[0].distance - 4.5).abs() < 1e-9);
        assert_eq!(out[1].kind, CrossingKind::Exit);
        assert!((out[1].distance - 5.5).abs() < 1e-9);
        assert_eq!(status, EntryStatus::Exited);
    }

    #[test]
    fn state_persists_across_segments() {
        let sphere = Sphere::new(Point3::ORIGIN, 1.5).expect("sphere");
        let mut status = EntryStatus::initial(true);
        let mut out = Vec::new();
        let first = LineSegment::new(Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0));
        track_segment(&sphere, &mut status, &first, &mut out);
        assert!(out.is_empty());
        assert_eq!(status, EntryStatus::NotExitedYet);

        let second = LineSegment::new(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0));
        track_segment(&sphere, &mut status, &second, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, CrossingKind::Exit);
        assert!((out[0].distance - 0.5).abs() < 1e-9);
        assert_eq!(status, EntryStatus::Exited);
    }
}
