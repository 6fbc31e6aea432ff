//! Shared deterministic types for pathway evaluation.
//!
//! The reason enumerations are the stable contract with downstream reporting
//! tools: their serialized names must not change.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Traversal direction relative to the seed that a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[default]
    Either,
    #[serde(rename = "side_A")]
    A,
    #[serde(rename = "side_B")]
    B,
}

impl Side {
    /// The opposite label; `Either` stays `Either`.
    pub fn flipped(self) -> Side {
        match self {
            Side::Either => Side::Either,
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    /// True if a rule declared with `self` applies while walking `walking`.
    pub fn applies_to(self, walking: Side) -> bool {
        self == Side::Either || walking == Side::Either || self == walking
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Either => "either",
            Side::A => "side_A",
            Side::B => "side_B",
        }
    }
}

/// Walker action after a step or a full evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Continue,
    Stop,
    Discard,
    /// Only produced by the surrounding tracking algorithm, never by pathway
    /// logic.
    Fail,
    Keep,
}

/// What happens when a walk reaches the maximum length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtMaxLength {
    #[default]
    Discard,
    Stop,
}

/// Why a streamline was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscardReason {
    TooShort,
    TooLong,
    DiscardRegionReached,
    RequiredRoiNotMet,
    RequiredOrderNotMet,
    EndedInsideDiscardRoi,
    CantMeetStopCondition,
    ReachedTimeLimit,
    SeedNotFound,
    DiscardSeed,
    ImproperSeed,
}

impl DiscardReason {
    pub const ALL: [DiscardReason; 11] = [
        DiscardReason::TooShort,
        DiscardReason::TooLong,
        DiscardReason::DiscardRegionReached,
        DiscardReason::RequiredRoiNotMet,
        DiscardReason::RequiredOrderNotMet,
        DiscardReason::EndedInsideDiscardRoi,
        DiscardReason::CantMeetStopCondition,
        DiscardReason::ReachedTimeLimit,
        DiscardReason::SeedNotFound,
        DiscardReason::DiscardSeed,
        DiscardReason::ImproperSeed,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn code(self) -> &'static str {
        match self {
            DiscardReason::TooShort => "TOO_SHORT",
            DiscardReason::TooLong => "TOO_LONG",
            DiscardReason::DiscardRegionReached => "DISCARD_REGION_REACHED",
            DiscardReason::RequiredRoiNotMet => "REQUIRED_ROI_NOT_MET",
            DiscardReason::RequiredOrderNotMet => "REQUIRED_ORDER_NOT_MET",
            DiscardReason::EndedInsideDiscardRoi => "ENDED_INSIDE_DISCARD_ROI",
            DiscardReason::CantMeetStopCondition => "CANT_MEET_STOP_CONDITION",
            DiscardReason::ReachedTimeLimit => "REACHED_TIME_LIMIT",
            DiscardReason::SeedNotFound => "SEED_NOT_FOUND",
            DiscardReason::DiscardSeed => "DISCARD_SEED",
            DiscardReason::ImproperSeed => "IMPROPER_SEED",
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Why one side of a kept streamline ended where it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationReason {
    SeedPoint,
    #[serde(rename = "MIN_DATASUPPORT_REACHED")]
    MinDataSupportReached,
    MaxLengthReached,
    StopRoiReached,
}

impl TerminationReason {
    pub const ALL: [TerminationReason; 4] = [
        TerminationReason::SeedPoint,
        TerminationReason::MinDataSupportReached,
        TerminationReason::MaxLengthReached,
        TerminationReason::StopRoiReached,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn code(self) -> &'static str {
        match self {
            TerminationReason::SeedPoint => "SEED_POINT",
            TerminationReason::MinDataSupportReached => "MIN_DATASUPPORT_REACHED",
            TerminationReason::MaxLengthReached => "MAX_LENGTH_REACHED",
            TerminationReason::StopRoiReached => "STOP_ROI_REACHED",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_match_serialized_names() {
        for reason in DiscardReason::ALL {
            let json = serde_json::to_string(&reason).expect("serialize");
            assert_eq!(json, format!("\"{}\"", reason.code()));
            assert_eq!(DiscardReason::ALL[reason.index()], reason);
        }
        for reason in TerminationReason::ALL {
            let json = serde_json::to_string(&reason).expect("serialize");
            assert_eq!(json, format!("\"{}\"", reason.code()));
        }
    }

    #[test]
    fn either_side_applies_everywhere() {
        assert!(Side::Either.applies_to(Side::A));
        assert!(Side::A.applies_to(Side::A));
        assert!(!Side::A.applies_to(Side::B));
        assert_eq!(Side::A.flipped(), Side::B);
    }
}
