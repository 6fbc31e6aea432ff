//! Per-streamline evaluation state.
//!
//! A [`Walker`] is driven one side at a time: [`Walker::begin_side`] at the
//! starting point, [`Walker::advance`] once per segment until something other
//! than [`StepOutcome::Continue`] comes back (or the streamline runs out), then
//! the end is tied (see `tying`). The same API serves batch filtering and an
//! external tracker deciding step by step whether to keep propagating.

use std::cmp::Ordering;

use crate::core::geometry::{LineSegment, Point3};
use crate::core::rules::RuleKind;
use crate::core::tracker::{CrossingKind, EntryStatus, TrackedCrossing, track_segment};
use crate::core::types::{Action, AtMaxLength, DiscardReason, Side, TerminationReason};
use crate::core::verify::{CompiledPathway, CompiledRule};

/// Tracking state of one compiled rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleState {
    pub status: EntryStatus,
    /// Require rule satisfied (in order, when ordering applies).
    pub done: bool,
    /// Satisfied ahead of its turn at least once.
    pub seen: bool,
}

/// Result of advancing over one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    Continue,
    /// Halt `distance` units past the segment start.
    Stop {
        distance: f64,
        reason: TerminationReason,
    },
    Discard(DiscardReason),
}

#[derive(Debug, Clone, Copy)]
enum EventKind {
    Rule(usize, CrossingKind),
    MaxLength,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    distance: f64,
    rank: usize,
    kind: EventKind,
}

/// Mutable evaluation state borrowed against a compiled pathway.
#[derive(Debug, Clone)]
pub struct Walker<'a> {
    pub(crate) pathway: &'a CompiledPathway,
    pub(crate) states: Vec<RuleState>,
    side: Side,
    pub(crate) counters: [usize; 2],
    action: Action,
    discard_reason: Option<DiscardReason>,
    termination: [Option<TerminationReason>; 2],
    tracked_length: f64,
    crossings: Vec<TrackedCrossing>,
    events: Vec<Event>,
}

pub(crate) fn side_slot(side: Side) -> usize {
    match side {
        Side::B => 1,
        Side::A | Side::Either => 0,
    }
}

impl<'a> Walker<'a> {
    pub fn new(pathway: &'a CompiledPathway) -> Self {
        Self {
            pathway,
            states: vec![RuleState::default(); pathway.rules.len()],
            side: Side::A,
            counters: [0, 0],
            action: Action::Continue,
            discard_reason: None,
            termination: [None, None],
            tracked_length: 0.0,
            crossings: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Soft reset between attempts; keeps allocations.
    pub fn reset(&mut self) {
        self.states.fill(RuleState::default());
        self.side = Side::A;
        self.counters = [0, 0];
        self.action = Action::Continue;
        self.discard_reason = None;
        self.termination = [None, None];
        self.tracked_length = 0.0;
    }

    pub fn pathway(&self) -> &'a CompiledPathway {
        self.pathway
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn discard_reason(&self) -> Option<DiscardReason> {
        self.discard_reason
    }

    pub fn termination(&self, side: Side) -> Option<TerminationReason> {
        self.termination[side_slot(side)]
    }

    /// Arc length walked so far, summed over sides.
    pub fn tracked_length(&self) -> f64 {
        self.tracked_length
    }

    pub fn state(&self, rule: usize) -> Option<&RuleState> {
        self.states.get(rule)
    }

    fn applies(&self, rule: &CompiledRule) -> bool {
        rule.kind.is_tracked() && rule.side.applies_to(self.side)
    }

    /// Start walking `side` from `start`.
    ///
    /// Initializes every tracked rule from whether `start` is inside its
    /// region. An inside start satisfies `require_entry` and triggers
    /// `discard_if_enters`; `stop_*_entry` rules do not fire on it.
    pub fn begin_side(&mut self, side: Side, start: Point3) -> StepOutcome {
        self.side = side;
        self.termination[side_slot(side)] = None;
        self.action = Action::Continue;

        let pathway = self.pathway;
        let mut satisfied: Vec<usize> = Vec::new();
        for (index, rule) in pathway.rules.iter().enumerate() {
            if !self.applies(rule) {
                continue;
            }
            let inside = rule.region.is_inside(start);
            self.states[index].status = EntryStatus::initial(inside);
            if !inside {
                continue;
            }
            match rule.kind {
                RuleKind::RequireEntry => satisfied.push(index),
                RuleKind::DiscardIfEnters => {
                    return self.discard(DiscardReason::DiscardRegionReached);
                }
                _ => {}
            }
        }
        satisfied.sort_by_key(|&index| pathway.rules[index].order_slot.unwrap_or(usize::MAX));
        for index in satisfied {
            self.satisfy(index);
        }
        StepOutcome::Continue
    }

    /// Process one segment of the current side.
    ///
    /// Crossings of every applicable rule and the maximum-length cut are
    /// handled in distance order; the first stop or discard wins.
    pub fn advance(&mut self, segment: LineSegment) -> StepOutcome {
        if self.action != Action::Continue {
            return self.current_outcome();
        }
        if segment.is_degenerate() {
            return StepOutcome::Continue;
        }

        let pathway = self.pathway;
        let mut events = std::mem::take(&mut self.events);
        events.clear();
        for (index, rule) in pathway.rules.iter().enumerate() {
            if !self.applies(rule) {
                continue;
            }
            self.crossings.clear();
            track_segment(
                rule.region.as_ref(),
                &mut self.states[index].status,
                &segment,
                &mut self.crossings,
            );
            events.extend(self.crossings.iter().map(|crossing| Event {
                distance: crossing.distance,
                rank: index,
                kind: EventKind::Rule(index, crossing.kind),
            }));
        }
        if pathway.has_max_length() {
            let remaining = pathway.max_length - self.tracked_length;
            if remaining < segment.len {
                events.push(Event {
                    distance: remaining.max(0.0),
                    rank: usize::MAX,
                    kind: EventKind::MaxLength,
                });
            }
        }
        events.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.rank.cmp(&b.rank))
        });

        let mut outcome = StepOutcome::Continue;
        for event in &events {
            outcome = self.handle_event(event, &segment);
            if outcome != StepOutcome::Continue {
                break;
            }
        }
        self.events = events;

        if outcome == StepOutcome::Continue {
            self.tracked_length += segment.len;
        }
        outcome
    }

    fn handle_event(&mut self, event: &Event, segment: &LineSegment) -> StepOutcome {
        let pathway = self.pathway;
        let (index, crossing) = match event.kind {
            EventKind::MaxLength => {
                return match pathway.at_max_length {
                    AtMaxLength::Stop => {
                        self.stop(event.distance, TerminationReason::MaxLengthReached)
                    }
                    AtMaxLength::Discard => self.discard(DiscardReason::TooLong),
                };
            }
            EventKind::Rule(index, crossing) => (index, crossing),
        };
        let rule = &pathway.rules[index];
        if rule.kind.reacts_to_entry() != (crossing == CrossingKind::Entry) {
            return StepOutcome::Continue;
        }
        match rule.kind {
            RuleKind::RequireEntry | RuleKind::RequireExit => {
                self.satisfy(index);
                StepOutcome::Continue
            }
            RuleKind::DiscardIfEnters | RuleKind::DiscardIfExits => {
                self.discard(DiscardReason::DiscardRegionReached)
            }
            kind if kind.is_stop() => match stop_distance(rule, event.distance, segment) {
                Some(distance) => self.stop(distance, TerminationReason::StopRoiReached),
                None => self.discard(DiscardReason::CantMeetStopCondition),
            },
            _ => StepOutcome::Continue,
        }
    }

    /// Mark a require rule as met, honouring in-order satisfaction.
    pub(crate) fn satisfy(&mut self, index: usize) {
        let rule = &self.pathway.rules[index];
        let state = &mut self.states[index];
        if state.done {
            return;
        }
        match rule.order_slot {
            Some(slot) if self.pathway.policy.in_order => {
                let counter = &mut self.counters[side_slot(rule.side)];
                match slot.cmp(counter) {
                    Ordering::Equal => {
                        state.done = true;
                        *counter += 1;
                    }
                    Ordering::Greater => state.seen = true,
                    Ordering::Less => {}
                }
            }
            _ => state.done = true,
        }
    }

    fn stop(&mut self, distance: f64, reason: TerminationReason) -> StepOutcome {
        self.action = Action::Stop;
        self.tracked_length += distance;
        self.termination[side_slot(self.side)] = Some(reason);
        StepOutcome::Stop { distance, reason }
    }

    pub(crate) fn discard(&mut self, reason: DiscardReason) -> StepOutcome {
        self.action = Action::Discard;
        self.discard_reason = Some(reason);
        StepOutcome::Discard(reason)
    }

    /// The current side ran out of streamline.
    pub fn finish_side(&mut self) {
        if self.action == Action::Continue {
            self.action = Action::Stop;
            self.termination[side_slot(self.side)] =
                Some(TerminationReason::MinDataSupportReached);
        }
    }

    /// Record that the current side ends at the seed.
    pub fn mark_seed_end(&mut self, side: Side) {
        self.termination[side_slot(side)] = Some(TerminationReason::SeedPoint);
    }

    /// Failure reported by the surrounding tracking algorithm.
    pub fn fail(&mut self) {
        self.action = Action::Fail;
    }

    fn current_outcome(&self) -> StepOutcome {
        match (self.action, self.discard_reason) {
            (Action::Discard, Some(reason)) => StepOutcome::Discard(reason),
            (Action::Stop, _) => StepOutcome::Stop {
                distance: 0.0,
                reason: self
                    .termination(self.side)
                    .unwrap_or(TerminationReason::MinDataSupportReached),
            },
            _ => StepOutcome::Continue,
        }
    }
}

/// Crop distance for a stop rule whose crossing lies at `distance`.
///
/// `before`/`after` variants shift by one boundary step of the region and
/// re-test that the shifted point is on the required side; `None` means the
/// condition cannot be met. The shift is not clamped: near a segment end the
/// segment is lengthened virtually and the result may fall outside
/// `[0, segment.len]`.
fn stop_distance(rule: &CompiledRule, distance: f64, segment: &LineSegment) -> Option<f64> {
    let step = rule.region.boundary_step(segment);
    let (shifted, want_inside) = match rule.kind {
        RuleKind::StopAtEntry | RuleKind::StopAtExit => return Some(distance),
        RuleKind::StopBeforeEntry => (distance - step, false),
        RuleKind::StopAfterEntry => (distance + step, true),
        RuleKind::StopBeforeExit => (distance - step, true),
        RuleKind::StopAfterExit => (distance + step, false),
        _ => return Some(distance),
    };
    (rule.region.is_inside(segment.extended_point(shifted)) == want_inside).then_some(shifted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::PathwayPolicy;
    use crate::core::region::RegionRegistry;
    use crate::core::rules::Rule;
    use crate::core::verify::compile;

    fn x(v: f64) -> Point3 {
        Point3::new(v, 0.0, 0.0)
    }

    fn seg(a: f64, b: f64) -> LineSegment {
        LineSegment::new(x(a), x(b))
    }

    fn compiled(rules: &[(RuleKind, Point3, f64)], policy: PathwayPolicy) -> CompiledPathway {
        let mut regions = RegionRegistry::new();
        let rules: Vec<Rule> = rules
            .iter()
            .map(|&(kind, center, radius)| {
                Rule::new(kind, regions.sphere(center, radius).expect("sphere"))
            })
            .collect();
        compile(&regions, &rules, &policy).expect("compile")
    }

    #[test]
    fn stop_at_exit_reports_exit_distance() {
        let pathway = compiled(
            &[
                (RuleKind::Seed, x(0.0), 0.5),
                (RuleKind::StopAtExit, x(0.0), 3.0),
            ],
            PathwayPolicy::default(),
        );
        let mut walker = Walker::new(&pathway);
        assert_eq!(walker.begin_side(Side::B, x(0.0)), StepOutcome::Continue);
        assert_eq!(walker.advance(seg(0.0, 2.0)), StepOutcome::Continue);
        match walker.advance(seg(2.0, 4.0)) {
            StepOutcome::Stop { distance, reason } => {
                assert!((distance - 1.0).abs() < 1e-9);
                assert_eq!(reason, TerminationReason::StopRoiReached);
            }
            other => panic!("expected stop, got {other:?}"),
        }
        assert!((walker.tracked_length() - 3.0).abs() < 1e-9);
        assert_eq!(walker.action(), Action::Stop);
        assert_eq!(
            walker.termination(Side::B),
            Some(TerminationReason::StopRoiReached)
        );
    }

    #[test]
    fn nearest_event_wins() {
        let pathway = compiled(
            &[
                (RuleKind::Seed, x(0.0), 0.5),
                (RuleKind::DiscardIfEnters, x(8.0), 1.0),
                (RuleKind::StopAtEntry, x(4.0), 1.0),
            ],
            PathwayPolicy::default(),
        );
        let mut walker = Walker::new(&pathway);
        walker.begin_side(Side::B, x(0.0));
        match walker.advance(seg(0.0, 10.0)) {
            StepOutcome::Stop { distance, .. } => assert!((distance - 3.0).abs() < 1e-9),
            other => panic!("expected stop, got {other:?}"),
        }

        let mut walker = Walker::new(&pathway);
        walker.begin_side(Side::A, x(0.0));
        assert_eq!(walker.advance(seg(0.0, -10.0)), StepOutcome::Continue);
    }

    #[test]
    fn max_length_cut_discards_or_stops() {
        let discard = compiled(
            &[],
            PathwayPolicy {
                max_length: Some(5.0),
                ..PathwayPolicy::default()
            },
        );
        let mut walker = Walker::new(&discard);
        walker.begin_side(Side::A, x(0.0));
        assert_eq!(walker.advance(seg(0.0, 4.0)), StepOutcome::Continue);
        assert_eq!(
            walker.advance(seg(4.0, 8.0)),
            StepOutcome::Discard(DiscardReason::TooLong)
        );

        let stop = compiled(
            &[],
            PathwayPolicy {
                max_length: Some(5.0),
                stop_at_max: true,
                ..PathwayPolicy::default()
            },
        );
        let mut walker = Walker::new(&stop);
        walker.begin_side(Side::A, x(0.0));
        walker.advance(seg(0.0, 4.0));
        assert_eq!(
            walker.advance(seg(4.0, 8.0)),
            StepOutcome::Stop {
                distance: 1.0,
                reason: TerminationReason::MaxLengthReached
            }
        );
    }

    #[test]
    fn inside_start_satisfies_entry_and_triggers_discard() {
        let pathway = compiled(
            &[(RuleKind::RequireEntry, x(0.0), 1.0)],
            PathwayPolicy::default(),
        );
        let mut walker = Walker::new(&pathway);
        walker.begin_side(Side::A, x(0.0));
        assert!(walker.state(0).expect("state").done);

        let pathway = compiled(
            &[(RuleKind::DiscardIfEnters, x(0.0), 1.0)],
            PathwayPolicy::default(),
        );
        let mut walker = Walker::new(&pathway);
        assert_eq!(
            walker.begin_side(Side::A, x(0.0)),
            StepOutcome::Discard(DiscardReason::DiscardRegionReached)
        );
        assert_eq!(walker.action(), Action::Discard);
    }

    #[test]
    fn stop_shift_respects_region_side() {
        let pathway = compiled(
            &[
                (RuleKind::Seed, x(0.0), 0.5),
                (RuleKind::StopBeforeEntry, x(5.0), 1.0),
            ],
            PathwayPolicy::default(),
        );
        let mut walker = Walker::new(&pathway);
        walker.begin_side(Side::B, x(0.0));
        match walker.advance(seg(0.0, 10.0)) {
            StepOutcome::Stop { distance, .. } => {
                assert!(distance < 4.0);
                assert!((distance - (4.0 - crate::core::tolerance::BOUNDARY_PUSH)).abs() < 1e-9);
            }
            other => panic!("expected stop, got {other:?}"),
        }
    }

    #[test]
    fn stop_shift_may_run_past_the_segment_end() {
        let pathway = compiled(
            &[
                (RuleKind::Seed, x(0.0), 0.5),
                (RuleKind::StopAfterExit, x(0.0), 3.0),
            ],
            PathwayPolicy::default(),
        );
        let mut walker = Walker::new(&pathway);
        walker.begin_side(Side::B, x(0.0));
        match walker.advance(seg(0.0, 3.0)) {
            StepOutcome::Stop { distance, .. } => {
                assert!((distance - (3.0 + crate::core::tolerance::BOUNDARY_PUSH)).abs() < 1e-9);
            }
            other => panic!("expected stop, got {other:?}"),
        }
    }

    #[test]
    fn out_of_order_entries_are_only_seen() {
        let pathway = compiled(
            &[
                (RuleKind::Seed, x(0.0), 0.5),
                (RuleKind::RequireEntry, x(4.0), 0.5),
                (RuleKind::RequireEntry, x(8.0), 0.5),
            ],
            PathwayPolicy {
                one_sided: true,
                in_order: true,
                ..PathwayPolicy::default()
            },
        );
        let mut walker = Walker::new(&pathway);
        walker.begin_side(Side::A, x(10.0));
        assert_eq!(walker.advance(seg(10.0, 0.0)), StepOutcome::Continue);
        assert!(walker.state(2).expect("state").seen);
        assert!(!walker.state(2).expect("state").done);
        assert!(walker.state(1).expect("state").done);
    }

    #[test]
    fn fail_is_external_only() {
        let pathway = compiled(&[], PathwayPolicy::default());
        let mut walker = Walker::new(&pathway);
        walker.begin_side(Side::A, x(0.0));
        walker.fail();
        assert_eq!(walker.action(), Action::Fail);
        walker.advance(seg(0.0, 1.0));
        assert_eq!(walker.action(), Action::Fail);
        assert_eq!(walker.tracked_length(), 0.0);
    }
}
