//! Whole-streamline evaluation in every traversal mode.
//!
//! The [`Evaluator`] owns nothing mutable: each call builds its own
//! [`Walker`], so one evaluator can serve many threads.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::core::geometry::{LineSegment, Point3};
use crate::core::region::Region;
use crate::core::rules::RuleKind;
use crate::core::seed::resolve_seed;
use crate::core::streamline::{
    RemovedVertex, Streamline, arc_length_between, crop, ensure_vertex, last_position, length,
    offset_position, point_at,
};
use crate::core::tracker::{CrossingKind, EntryStatus, track_segment};
use crate::core::types::{Action, DiscardReason, Side, TerminationReason};
use crate::core::verify::{CompiledPathway, TraversalMode};
use crate::core::walker::{StepOutcome, Walker};

/// Final decision for one streamline.
///
/// Positions are fractional vertex positions on the streamline as left by
/// [`Evaluator::evaluate`] (the interpolated seed vertex is only present when
/// `retain_seed_point` is set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discard_reason: Option<DiscardReason>,
    pub beg_ind: f64,
    pub end_ind: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_ind: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_a: Option<TerminationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_b: Option<TerminationReason>,
    pub tracked_length: f64,
}

impl Evaluation {
    pub fn discard(reason: DiscardReason) -> Self {
        Self {
            action: Action::Discard,
            discard_reason: Some(reason),
            beg_ind: 0.0,
            end_ind: 0.0,
            seed_ind: None,
            termination_a: None,
            termination_b: None,
            tracked_length: 0.0,
        }
    }

    pub fn is_kept(&self) -> bool {
        self.action == Action::Keep
    }

    pub fn termination(&self, side: Side) -> Option<TerminationReason> {
        match side {
            Side::B => self.termination_b,
            Side::A | Side::Either => self.termination_a,
        }
    }

    /// Kept part of `points`, or `None` for a discarded streamline.
    pub fn cropped(&self, points: &[Point3]) -> Option<Streamline> {
        self.is_kept().then(|| crop(points, self.beg_ind, self.end_ind))
    }
}

/// Where a walk ended.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Halt {
    Stopped(f64),
    Discarded(DiscardReason),
}

/// Kept range before seed-vertex removal.
#[derive(Debug, Clone, Copy)]
struct Kept {
    beg: f64,
    end: f64,
    seed: Option<f64>,
    termination: [Option<TerminationReason>; 2],
}

/// Stateless driver over a compiled pathway.
#[derive(Debug, Clone)]
pub struct Evaluator {
    pathway: Arc<CompiledPathway>,
}

impl Evaluator {
    pub fn new(pathway: Arc<CompiledPathway>) -> Self {
        Self { pathway }
    }

    pub fn pathway(&self) -> &CompiledPathway {
        &self.pathway
    }

    /// Evaluate with the per-streamline generator derived from `rng_seed` and
    /// `index`, so results do not depend on scheduling.
    pub fn evaluate(&self, points: &mut Streamline, index: u64) -> Evaluation {
        let mut rng = StdRng::seed_from_u64(self.pathway.policy.rng_seed ^ index);
        self.evaluate_with_rng(points, &mut rng)
    }

    /// Evaluate `points`, which may gain the interpolated seed vertex when
    /// `retain_seed_point` is set and the streamline is kept.
    pub fn evaluate_with_rng(&self, points: &mut Streamline, rng: &mut impl Rng) -> Evaluation {
        if points.is_empty() {
            return Evaluation::discard(DiscardReason::TooShort);
        }
        let pathway = &*self.pathway;
        let mut walker = Walker::new(pathway);
        let mut inserted_seed: Option<usize> = None;

        let outcome = match pathway.mode {
            TraversalMode::FastPath => self.fast_path(&mut walker, points, rng, &mut inserted_seed),
            TraversalMode::Unseeded => self.unseeded(&mut walker, points),
            TraversalMode::SeededOneSided => self.seeded_one_sided(&mut walker, points),
            TraversalMode::SeededTwoSided => {
                self.seeded_two_sided(&mut walker, points, rng, &mut inserted_seed)
            }
        };
        let outcome = outcome.and_then(|kept| {
            if arc_length_between(points, kept.beg, kept.end) < pathway.min_length {
                Err(DiscardReason::TooShort)
            } else {
                Ok(kept)
            }
        });

        let removed = match inserted_seed {
            Some(index) if outcome.is_err() || !pathway.policy.retain_seed_point => {
                Some(RemovedVertex::remove(points, index))
            }
            _ => None,
        };
        let map = |pos: f64| removed.map_or(pos, |removed| removed.map(pos));

        match outcome {
            Err(reason) => {
                trace!(mode = pathway.mode.label(), reason = reason.code(), "discarded");
                Evaluation::discard(reason)
            }
            Ok(kept) => {
                let (beg, end) = if kept.beg <= kept.end {
                    (kept.beg, kept.end)
                } else {
                    (kept.end, kept.beg)
                };
                Evaluation {
                    action: Action::Keep,
                    discard_reason: None,
                    beg_ind: map(beg),
                    end_ind: map(end),
                    seed_ind: kept.seed.map(map),
                    termination_a: kept.termination[0],
                    termination_b: kept.termination[1],
                    tracked_length: walker.tracked_length(),
                }
            }
        }
    }

    /// Nothing can truncate: check lengths, walk once, tie both ends.
    fn fast_path(
        &self,
        walker: &mut Walker<'_>,
        points: &mut Streamline,
        rng: &mut impl Rng,
        inserted_seed: &mut Option<usize>,
    ) -> Result<Kept, DiscardReason> {
        let pathway = &*self.pathway;
        let total = length(points);
        if total < pathway.min_length {
            return Err(DiscardReason::TooShort);
        }
        if total > pathway.max_length {
            return Err(DiscardReason::TooLong);
        }
        let seed = match pathway.seed {
            Some(_) => Some(self.place_seed(points, rng, inserted_seed)?),
            None => None,
        };

        if let Halt::Discarded(reason) = walk(walker, points, 0.0, true, Side::Either) {
            return Err(reason);
        }
        let last = last_position(points);
        let first_point = points[0];
        let last_point = point_at(points, last);
        if seed.is_some() {
            walker.tie_end(first_point, Side::A)?;
            walker.tie_end(last_point, Side::B)?;
        } else {
            walker.tie_unlabelled(first_point, last_point)?;
        }
        walker.check_requirements()?;
        Ok(Kept {
            beg: 0.0,
            end: last,
            seed,
            termination: [Some(TerminationReason::MinDataSupportReached); 2],
        })
    }

    /// Walk forward from the first vertex; on an order failure retry from the
    /// last vertex.
    fn unseeded(
        &self,
        walker: &mut Walker<'_>,
        points: &Streamline,
    ) -> Result<Kept, DiscardReason> {
        match self.unseeded_attempt(walker, points, true) {
            Err(DiscardReason::RequiredOrderNotMet) => {
                walker.reset();
                self.unseeded_attempt(walker, points, false)
            }
            other => other,
        }
    }

    fn unseeded_attempt(
        &self,
        walker: &mut Walker<'_>,
        points: &Streamline,
        forward: bool,
    ) -> Result<Kept, DiscardReason> {
        let last = last_position(points);
        let start = if forward { 0.0 } else { last };
        let stop = match walk(walker, points, start, forward, Side::A) {
            Halt::Discarded(reason) => return Err(reason),
            Halt::Stopped(pos) => pos,
        };
        let (first, second) = if forward { (start, stop) } else { (stop, start) };
        let swapped = walker.tie_unlabelled(point_at(points, first), point_at(points, second))?;
        walker.tie_order(Side::A)?;
        walker.check_requirements()?;

        let untouched = Some(TerminationReason::MinDataSupportReached);
        let walked = walker.termination(Side::A);
        let mut termination = if forward {
            [untouched, walked]
        } else {
            [walked, untouched]
        };
        if swapped {
            termination.swap(0, 1);
        }
        Ok(Kept {
            beg: first,
            end: second,
            seed: None,
            termination,
        })
    }

    /// Seed at a physical end inside the seed region, walk away from it.
    fn seeded_one_sided(
        &self,
        walker: &mut Walker<'_>,
        points: &Streamline,
    ) -> Result<Kept, DiscardReason> {
        let pathway = &*self.pathway;
        let Some(seed_rule) = pathway.seed_rule() else {
            return Err(DiscardReason::SeedNotFound);
        };
        let region = seed_rule.region.as_ref();
        let last = last_position(points);
        let mut ends = Vec::with_capacity(2);
        if region.is_inside(points[0]) {
            ends.push((0.0, true));
        }
        if last > 0.0 && region.is_inside(point_at(points, last)) {
            ends.push((last, false));
        }
        let Some(&(start, forward)) = ends.first() else {
            return Err(DiscardReason::SeedNotFound);
        };

        match self.one_sided_attempt(walker, points, region, start, forward) {
            Err(DiscardReason::RequiredOrderNotMet) if ends.len() > 1 => {
                walker.reset();
                let (start, forward) = ends[1];
                self.one_sided_attempt(walker, points, region, start, forward)
            }
            other => other,
        }
    }

    fn one_sided_attempt(
        &self,
        walker: &mut Walker<'_>,
        points: &Streamline,
        seed_region: &dyn Region,
        start: f64,
        forward: bool,
    ) -> Result<Kept, DiscardReason> {
        self.check_seed_point(point_at(points, start))?;
        let origin = if self.pathway.policy.skip_seed {
            exit_position(seed_region, points, start, forward).ok_or(DiscardReason::ImproperSeed)?
        } else {
            start
        };
        let stop = match walk(walker, points, origin, forward, Side::A) {
            Halt::Discarded(reason) => return Err(reason),
            Halt::Stopped(pos) => pos,
        };
        walker.tie(point_at(points, stop), Side::A)?;
        walker.mark_seed_end(Side::B);
        walker.check_requirements()?;
        Ok(Kept {
            beg: origin,
            end: stop,
            seed: Some(start),
            termination: [walker.termination(Side::A), walker.termination(Side::B)],
        })
    }

    /// Resolve an interior seed, then walk side A towards the first vertex and
    /// side B towards the last one.
    fn seeded_two_sided(
        &self,
        walker: &mut Walker<'_>,
        points: &mut Streamline,
        rng: &mut impl Rng,
        inserted_seed: &mut Option<usize>,
    ) -> Result<Kept, DiscardReason> {
        let seed = self.place_seed(points, rng, inserted_seed)?;

        let end_a = match walk(walker, points, seed, false, Side::A) {
            Halt::Discarded(reason) => return Err(reason),
            Halt::Stopped(pos) => pos,
        };
        walker.tie(point_at(points, end_a), Side::A)?;

        let end_b = match walk(walker, points, seed, true, Side::B) {
            Halt::Discarded(reason) => return Err(reason),
            Halt::Stopped(pos) => pos,
        };
        walker.tie(point_at(points, end_b), Side::B)?;
        walker.check_requirements()?;

        Ok(Kept {
            beg: end_a,
            end: end_b,
            seed: Some(seed),
            termination: [walker.termination(Side::A), walker.termination(Side::B)],
        })
    }

    /// Resolve the seed, validate it and make it a vertex.
    fn place_seed(
        &self,
        points: &mut Streamline,
        rng: &mut impl Rng,
        inserted_seed: &mut Option<usize>,
    ) -> Result<f64, DiscardReason> {
        let pathway = &*self.pathway;
        let Some(seed_rule) = pathway.seed_rule() else {
            return Err(DiscardReason::SeedNotFound);
        };
        let pos = resolve_seed(
            seed_rule.region.as_ref(),
            points,
            pathway.policy.seed_trials,
            rng,
        )
        .ok_or(DiscardReason::SeedNotFound)?;
        self.check_seed_point(point_at(points, pos))?;
        let at = ensure_vertex(points, pos);
        if at.inserted {
            *inserted_seed = Some(at.index);
        }
        Ok(at.index as f64)
    }

    /// `discard_seed` regions reject the seed outright; a seed inside a
    /// `discard_if_enters` region can never produce a valid streamline.
    fn check_seed_point(&self, seed: Point3) -> Result<(), DiscardReason> {
        let rules = &self.pathway.rules;
        if rules
            .iter()
            .any(|rule| rule.kind == RuleKind::DiscardSeed && rule.region.is_inside(seed))
        {
            return Err(DiscardReason::DiscardSeed);
        }
        if rules
            .iter()
            .any(|rule| rule.kind == RuleKind::DiscardIfEnters && rule.region.is_inside(seed))
        {
            return Err(DiscardReason::ImproperSeed);
        }
        Ok(())
    }
}

/// Next vertex position from `pos` in the walking direction.
fn next_position(pos: f64, last: f64, forward: bool) -> Option<f64> {
    if forward {
        (pos < last).then(|| (pos.floor() + 1.0).min(last))
    } else {
        (pos > 0.0).then(|| (pos.ceil() - 1.0).max(0.0))
    }
}

/// Drive `walker` along `points` from `start` until it halts.
fn walk(
    walker: &mut Walker<'_>,
    points: &[Point3],
    start: f64,
    forward: bool,
    side: Side,
) -> Halt {
    if let StepOutcome::Discard(reason) = walker.begin_side(side, point_at(points, start)) {
        return Halt::Discarded(reason);
    }
    let last = last_position(points);
    let mut pos = start;
    while let Some(next) = next_position(pos, last, forward) {
        let segment = LineSegment::new(point_at(points, pos), point_at(points, next));
        match walker.advance(segment) {
            StepOutcome::Continue => pos = next,
            StepOutcome::Stop { distance, .. } => {
                if (0.0..=segment.len).contains(&distance) {
                    let fraction = if segment.is_degenerate() {
                        0.0
                    } else {
                        distance / segment.len
                    };
                    return Halt::Stopped(pos + (next - pos) * fraction);
                }
                // Shifted stop spilling into a neighbouring segment; never
                // behind the side's starting point.
                let stop = offset_position(points, pos, distance, forward);
                let stop = if forward { stop.max(start) } else { stop.min(start) };
                return Halt::Stopped(stop);
            }
            StepOutcome::Discard(reason) => return Halt::Discarded(reason),
        }
    }
    walker.finish_side();
    Halt::Stopped(pos)
}

/// Position where the walk from `start` first leaves `region`.
fn exit_position(region: &dyn Region, points: &[Point3], start: f64, forward: bool) -> Option<f64> {
    let last = last_position(points);
    let mut status = EntryStatus::initial(region.is_inside(point_at(points, start)));
    let mut crossings = Vec::new();
    let mut pos = start;
    while let Some(next) = next_position(pos, last, forward) {
        let segment = LineSegment::new(point_at(points, pos), point_at(points, next));
        if !segment.is_degenerate() {
            crossings.clear();
            track_segment(region, &mut status, &segment, &mut crossings);
            if let Some(exit) = crossings.iter().find(|c| c.kind == CrossingKind::Exit) {
                return Some(pos + (next - pos) * (exit.distance / segment.len));
            }
        }
        pos = next;
    }
    None
}
