//! Rule kinds and rule descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::region::RegionId;
use crate::core::types::Side;

/// Semantics of one pathway rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Seed,
    DiscardSeed,
    RequireEntry,
    RequireExit,
    RequireEndInside,
    StopBeforeEntry,
    StopAtEntry,
    StopAfterEntry,
    StopBeforeExit,
    StopAtExit,
    StopAfterExit,
    DiscardIfEnters,
    DiscardIfExits,
    DiscardIfEndsInside,
}

impl RuleKind {
    pub const ALL: [RuleKind; 14] = [
        RuleKind::Seed,
        RuleKind::DiscardSeed,
        RuleKind::RequireEntry,
        RuleKind::RequireExit,
        RuleKind::RequireEndInside,
        RuleKind::StopBeforeEntry,
        RuleKind::StopAtEntry,
        RuleKind::StopAfterEntry,
        RuleKind::StopBeforeExit,
        RuleKind::StopAtExit,
        RuleKind::StopAfterExit,
        RuleKind::DiscardIfEnters,
        RuleKind::DiscardIfExits,
        RuleKind::DiscardIfEndsInside,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RuleKind::Seed => "seed",
            RuleKind::DiscardSeed => "discard_seed",
            RuleKind::RequireEntry => "require_entry",
            RuleKind::RequireExit => "require_exit",
            RuleKind::RequireEndInside => "require_end_inside",
            RuleKind::StopBeforeEntry => "stop_before_entry",
            RuleKind::StopAtEntry => "stop_at_entry",
            RuleKind::StopAfterEntry => "stop_after_entry",
            RuleKind::StopBeforeExit => "stop_before_exit",
            RuleKind::StopAtExit => "stop_at_exit",
            RuleKind::StopAfterExit => "stop_after_exit",
            RuleKind::DiscardIfEnters => "discard_if_enters",
            RuleKind::DiscardIfExits => "discard_if_exits",
            RuleKind::DiscardIfEndsInside => "discard_if_ends_inside",
        }
    }

    pub fn is_stop(self) -> bool {
        matches!(
            self,
            RuleKind::StopBeforeEntry
                | RuleKind::StopAtEntry
                | RuleKind::StopAfterEntry
                | RuleKind::StopBeforeExit
                | RuleKind::StopAtExit
                | RuleKind::StopAfterExit
        )
    }

    /// Rules satisfied by an event along the walk.
    pub fn is_require(self) -> bool {
        matches!(
            self,
            RuleKind::RequireEntry | RuleKind::RequireExit | RuleKind::RequireEndInside
        )
    }

    /// Rules whose satisfaction takes part in in-order checking.
    pub fn is_ordered(self) -> bool {
        matches!(self, RuleKind::RequireEntry | RuleKind::RequireExit)
    }

    /// Rules evaluated only at a halted end.
    pub fn is_end_rule(self) -> bool {
        matches!(
            self,
            RuleKind::RequireEndInside | RuleKind::DiscardIfEndsInside
        )
    }

    /// Rules whose region is tracked segment by segment.
    pub fn is_tracked(self) -> bool {
        matches!(
            self,
            RuleKind::RequireEntry
                | RuleKind::RequireExit
                | RuleKind::DiscardIfEnters
                | RuleKind::DiscardIfExits
        ) || self.is_stop()
    }

    /// Rules that react to entering (as opposed to exiting) their region.
    pub fn reacts_to_entry(self) -> bool {
        matches!(
            self,
            RuleKind::RequireEntry
                | RuleKind::DiscardIfEnters
                | RuleKind::StopBeforeEntry
                | RuleKind::StopAtEntry
                | RuleKind::StopAfterEntry
        )
    }

    /// Kinds that may carry an `_A` / `_B` suffix.
    pub fn accepts_side(self) -> bool {
        !matches!(self, RuleKind::Seed | RuleKind::DiscardSeed)
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown rule kind '{s}'"))
    }
}

/// Rule name with its optional side suffix, as written in configuration
/// (`require_entry`, `stop_at_exit_B`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleName {
    pub kind: RuleKind,
    pub side: Side,
}

impl FromStr for RuleName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (base, side) = if let Some(base) = s.strip_suffix("_A") {
            (base, Side::A)
        } else if let Some(base) = s.strip_suffix("_B") {
            (base, Side::B)
        } else {
            (s, Side::Either)
        };
        let kind: RuleKind = base.parse()?;
        if side != Side::Either && !kind.accepts_side() {
            return Err(format!("rule '{kind}' cannot take a side suffix"));
        }
        Ok(RuleName { kind, side })
    }
}

impl fmt::Display for RuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.side {
            Side::Either => write!(f, "{}", self.kind),
            Side::A => write!(f, "{}_A", self.kind),
            Side::B => write!(f, "{}_B", self.kind),
        }
    }
}

/// One declared constraint: kind, side and the region it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub kind: RuleKind,
    pub side: Side,
    pub region: RegionId,
}

impl Rule {
    pub fn new(kind: RuleKind, region: RegionId) -> Self {
        Self {
            kind,
            side: Side::Either,
            region,
        }
    }

    pub fn sided(kind: RuleKind, side: Side, region: RegionId) -> Self {
        Self { kind, side, region }
    }

    pub fn name(&self) -> RuleName {
        RuleName {
            kind: self.kind,
            side: self.side,
        }
    }
}
