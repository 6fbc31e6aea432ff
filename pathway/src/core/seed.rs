//! Seed position resolution along a streamline.

use rand::Rng;

use crate::core::geometry::{LineSegment, Point3};
use crate::core::region::Region;
use crate::core::streamline::{
    arc_length_between, last_position, point_at, position_at_arc_length,
};
use crate::core::tolerance::{BOUNDARY_PUSH, LENGTH_EPS};
use crate::core::tracker::{CrossingKind, EntryStatus, track_segment};

/// Closed interval of fractional positions `[beg, end]`.
pub type PositionInterval = (f64, f64);

/// Candidate seed intervals of `region` along `points`.
///
/// Volumetric regions yield at most one interval, spanning from the first
/// entry scanning forward to the first entry scanning backward. Open surfaces
/// yield every inside interval, including ones touching the ends.
pub fn seed_intervals(region: &dyn Region, points: &[Point3]) -> Vec<PositionInterval> {
    match points.len() {
        0 => Vec::new(),
        1 => {
            if region.is_inside(points[0]) {
                vec![(0.0, 0.0)]
            } else {
                Vec::new()
            }
        }
        _ if region.is_open() => open_intervals(region, points),
        _ => volumetric_interval(region, points).into_iter().collect(),
    }
}

fn volumetric_interval(region: &dyn Region, points: &[Point3]) -> Option<PositionInterval> {
    let forward = (0..points.len() - 1).find_map(|k| {
        let seg = LineSegment::new(points[k], points[k + 1]);
        region.entering(&seg).map(|c| k as f64 + c.fraction)
    })?;
    let backward = (1..points.len()).rev().find_map(|k| {
        let seg = LineSegment::new(points[k], points[k - 1]);
        region.entering(&seg).map(|c| k as f64 - c.fraction)
    })?;
    (backward >= forward).then_some((forward, backward))
}

fn open_intervals(region: &dyn Region, points: &[Point3]) -> Vec<PositionInterval> {
    let mut intervals = Vec::new();
    let mut status = EntryStatus::initial(region.is_inside(points[0]));
    let mut open_at = status.is_inside().then_some(0.0);
    let mut crossings = Vec::new();
    for k in 0..points.len() - 1 {
        let seg = LineSegment::new(points[k], points[k + 1]);
        if seg.is_degenerate() {
            continue;
        }
        crossings.clear();
        track_segment(region, &mut status, &seg, &mut crossings);
        for crossing in &crossings {
            let pos = k as f64 + crossing.distance / seg.len;
            match crossing.kind {
                CrossingKind::Entry => open_at = Some(pos),
                CrossingKind::Exit => {
                    if let Some(beg) = open_at.take() {
                        intervals.push((beg, pos));
                    }
                }
            }
        }
    }
    if let Some(beg) = open_at {
        intervals.push((beg, last_position(points)));
    }
    intervals
}

/// Pick a seed position inside `region`.
///
/// Draws up to `trials` uniform positions (uniform over intervals first when
/// there are several) and accepts one that is inside and off the boundary.
/// Falls back to the interval ends pushed inward, then the midpoints.
pub fn resolve_seed(
    region: &dyn Region,
    points: &[Point3],
    trials: u32,
    rng: &mut impl Rng,
) -> Option<f64> {
    let intervals = seed_intervals(region, points);
    if intervals.is_empty() {
        return None;
    }
    let accept = |pos: f64| {
        let p = point_at(points, pos);
        region.is_inside(p) && !region.is_near_boundary(p, LENGTH_EPS)
    };
    for _ in 0..trials {
        let (beg, end) = intervals[rng.gen_range(0..intervals.len())];
        let pos = if end > beg {
            rng.gen_range(beg..=end)
        } else {
            beg
        };
        if accept(pos) {
            return Some(pos);
        }
    }
    intervals
        .iter()
        .flat_map(|&(beg, end)| fallback_candidates(points, beg, end))
        .find(|&pos| region.is_inside(point_at(points, pos)))
}

fn fallback_candidates(points: &[Point3], beg: f64, end: f64) -> [f64; 3] {
    let beg_arc = arc_length_between(points, 0.0, beg);
    let end_arc = arc_length_between(points, 0.0, end);
    let span = end_arc - beg_arc;
    let push = BOUNDARY_PUSH.min(0.5 * span.max(0.0));
    [
        position_at_arc_length(points, beg_arc + push),
        position_at_arc_length(points, end_arc - push),
        position_at_arc_length(points, 0.5 * (beg_arc + end_arc)),
    ]
}
