//! Global tracking policy that shapes how rules are applied.

use serde::{Deserialize, Serialize};

use crate::core::types::AtMaxLength;

/// Trials drawn by the seed resolver before falling back to interval ends.
pub const DEFAULT_SEED_TRIALS: u32 = 100;

/// Length limits and traversal switches for a pathway.
///
/// Missing fields default, so a `[policy]` table only needs the settings that
/// differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathwayPolicy {
    /// Streamlines shorter than this are discarded (`TOO_SHORT`).
    pub min_length: f64,

    /// `None` means unbounded.
    pub max_length: Option<f64>,

    /// Crop at `max_length` instead of discarding with `TOO_LONG`.
    pub stop_at_max: bool,

    /// Track only away from the seed instead of in both directions.
    pub one_sided: bool,

    /// Require rules must be met in declared order on each side.
    pub in_order: bool,

    /// Start evaluating where the streamline leaves the seed region.
    pub skip_seed: bool,

    pub seed_trials: u32,

    /// Keep the interpolated seed vertex in kept output.
    pub retain_seed_point: bool,

    /// Base for per-streamline seed sampling.
    pub rng_seed: u64,
}

impl Default for PathwayPolicy {
    fn default() -> Self {
        Self {
            min_length: 0.0,
            max_length: None,
            stop_at_max: false,
            one_sided: false,
            in_order: false,
            skip_seed: false,
            seed_trials: DEFAULT_SEED_TRIALS,
            retain_seed_point: false,
            rng_seed: 0,
        }
    }
}

impl PathwayPolicy {
    pub fn at_max_length(&self) -> AtMaxLength {
        if self.stop_at_max {
            AtMaxLength::Stop
        } else {
            AtMaxLength::Discard
        }
    }

    /// Maximum length, `f64::INFINITY` when unbounded.
    pub fn max_length_or_inf(&self) -> f64 {
        self.max_length.unwrap_or(f64::INFINITY)
    }

    pub fn has_max_length(&self) -> bool {
        self.max_length.is_some_and(f64::is_finite)
    }

    pub fn two_sided(&self) -> bool {
        !self.one_sided
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_table_uses_defaults() {
        let policy: PathwayPolicy = toml::from_str("max_length = 80.0\nin_order = true\n")
            .expect("parse policy");
        assert_eq!(policy.max_length, Some(80.0));
        assert!(policy.in_order);
        assert_eq!(policy.seed_trials, DEFAULT_SEED_TRIALS);
        assert_eq!(policy.at_max_length(), AtMaxLength::Discard);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = toml::from_str::<PathwayPolicy>("max_lenght = 3.0\n").expect_err("typo");
        assert!(err.to_string().contains("max_lenght"));
    }
}
