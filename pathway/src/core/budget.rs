//! Wall-clock budget for batch evaluation.

use std::time::{Duration, Instant};

use crate::core::types::DiscardReason;

/// Return the remaining time budget until the provided deadline, or `None`
/// once it has passed.
pub fn remaining_budget(deadline: Instant) -> Option<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return None;
    }
    Some(remaining)
}

/// Optional deadline checked before each streamline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn unlimited() -> Self {
        Self(None)
    }

    pub fn after(limit: Duration) -> Self {
        Self(Some(Instant::now() + limit))
    }

    pub fn from_limit(limit: Option<Duration>) -> Self {
        limit.map_or_else(Self::unlimited, Self::after)
    }

    pub fn is_unlimited(&self) -> bool {
        self.0.is_none()
    }

    /// `REACHED_TIME_LIMIT` once the deadline has passed.
    pub fn check(&self) -> Result<(), DiscardReason> {
        match self.0 {
            Some(deadline) if remaining_budget(deadline).is_none() => {
                Err(DiscardReason::ReachedTimeLimit)
            }
            _ => Ok(()),
        }
    }
}
