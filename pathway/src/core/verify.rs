//! Rule verification and compilation.
//!
//! [`compile`] turns declared rules plus policy into a [`CompiledPathway`] or a
//! [`PathwayError`]; it never produces partial state. Side resolution is a pure
//! function ([`resolve_sides`]) so declared rules are never mutated.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::policy::PathwayPolicy;
use crate::core::region::{Region, RegionId, RegionRegistry};
use crate::core::rules::{Rule, RuleKind, RuleName};
use crate::core::types::{AtMaxLength, Side};

/// Configuration errors, reported synchronously when rules or policy change.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathwayError {
    #[error("rule {index} ({rule}) references unknown {region}")]
    MissingRegion {
        index: usize,
        rule: RuleName,
        region: RegionId,
    },

    #[error("{what} must be finite and >= 0 (got {value})")]
    NegativeLength { what: &'static str, value: f64 },

    #[error("min_length {min} exceeds max_length {max}")]
    MinExceedsMax { min: f64, max: f64 },

    #[error("rule {index} ({rule}) requires a seed rule")]
    StopWithoutSeed { index: usize, rule: RuleName },

    #[error("rule {index} ({rule}) is side-specific but no seed rule defines the sides")]
    SidedRuleWithoutSeed { index: usize, rule: RuleName },

    #[error("rule {index} ({rule}) needs an explicit _A or _B side when no seed rule is defined")]
    EndRuleWithoutSide { index: usize, rule: RuleName },

    #[error("one_sided tracking cannot use side-specific rule {index} ({rule})")]
    OneSidedWithSides { index: usize, rule: RuleName },

    #[error("skip_seed requires one_sided tracking")]
    SkipSeedRequiresOneSided,

    #[error("{what} requires a seed rule")]
    SeedFlagWithoutSeed { what: &'static str },

    #[error("rule {index} ({rule}) cannot take a side")]
    SidedSeed { index: usize, rule: RuleName },

    #[error("seed_trials must be >= 1")]
    InvalidSeedTrials,

    #[error("rule index {index} out of range ({len} rules)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("{error} (restoring the previous rules also failed: {restore})")]
    RestoreFailed {
        #[source]
        error: Box<PathwayError>,
        restore: Box<PathwayError>,
    },

    #[error(
        "in-order two-sided tracking cannot mix side-specific rules with unsided require rule {index} ({rule})"
    )]
    MixedSides { index: usize, rule: RuleName },
}

/// How the orchestrator drives evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// Nothing can truncate: one pass over the whole streamline.
    FastPath,
    Unseeded,
    SeededOneSided,
    SeededTwoSided,
}

impl TraversalMode {
    pub fn label(self) -> &'static str {
        match self {
            TraversalMode::FastPath => "fast-path",
            TraversalMode::Unseeded => "unseeded",
            TraversalMode::SeededOneSided => "seeded one-sided",
            TraversalMode::SeededTwoSided => "seeded two-sided",
        }
    }
}

/// Rule after verification: effective kind, resolved side and shared region.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Index in the declared rule list.
    pub index: usize,
    pub declared: RuleKind,
    /// Differs from `declared` only for `seed` rules when several seeds
    /// disable seed logic (they then behave as `require_entry`).
    pub kind: RuleKind,
    pub side: Side,
    pub region_id: RegionId,
    pub region: Arc<dyn Region>,
    /// Position in the order list of `side` (A for unsided orders).
    pub order_slot: Option<usize>,
}

impl CompiledRule {
    pub fn name(&self) -> RuleName {
        RuleName {
            kind: self.declared,
            side: self.side,
        }
    }
}

/// Read-only verified view shared by all evaluations.
#[derive(Debug, Clone)]
pub struct CompiledPathway {
    pub rules: Vec<CompiledRule>,
    /// Index into `rules` of the single seed rule.
    pub seed: Option<usize>,
    pub stop_flag: bool,
    /// Rule indices (into `rules`) that must be satisfied in sequence.
    pub order_a: Vec<usize>,
    pub order_b: Vec<usize>,
    pub min_length: f64,
    /// `f64::INFINITY` when unbounded.
    pub max_length: f64,
    pub at_max_length: AtMaxLength,
    pub mode: TraversalMode,
    pub policy: PathwayPolicy,
}

impl CompiledPathway {
    pub fn order(&self, side: Side) -> &[usize] {
        match side {
            Side::B => &self.order_b,
            Side::A | Side::Either => &self.order_a,
        }
    }

    pub fn seed_rule(&self) -> Option<&CompiledRule> {
        self.seed.map(|index| &self.rules[index])
    }

    pub fn has_max_length(&self) -> bool {
        self.max_length.is_finite()
    }

    /// One-line human summary used by `pathway verify`.
    pub fn summary(&self) -> String {
        let max = if self.has_max_length() {
            format!("{}", self.max_length)
        } else {
            "inf".to_string()
        };
        format!(
            "{} rules, mode {}, seed {}, stop_flag {}, order A {:?}, order B {:?}, length [{}, {}]",
            self.rules.len(),
            self.mode.label(),
            self.seed
                .map(|index| format!("#{index}"))
                .unwrap_or_else(|| "none".to_string()),
            self.stop_flag,
            self.order_a,
            self.order_b,
            self.min_length,
            max,
        )
    }
}

/// Sides and order lists after optional pulling around the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRules {
    pub sides: Vec<Side>,
    pub order_a: Vec<usize>,
    pub order_b: Vec<usize>,
}

/// Resolve the effective side of every rule and the per-side order lists.
///
/// With a seed, two-sided in-order tracking and no explicit sides, rules
/// declared before the seed move to side A (ordered from the seed outwards,
/// i.e. reverse declared order) and rules after it to side B (forward order).
/// Otherwise ordered rules keep their declared side, and unsided orders live
/// in list A.
pub fn resolve_sides(
    kinds: &[RuleKind],
    sides: &[Side],
    seed: Option<usize>,
    policy: &PathwayPolicy,
) -> ResolvedRules {
    debug_assert_eq!(kinds.len(), sides.len());
    let explicit = sides.iter().any(|side| *side != Side::Either);
    let mut resolved = sides.to_vec();
    let mut order_a = Vec::new();
    let mut order_b = Vec::new();

    match seed {
        Some(seed) if policy.two_sided() && policy.in_order && !explicit => {
            for (index, kind) in kinds.iter().enumerate() {
                if index == seed || !kind.accepts_side() {
                    continue;
                }
                resolved[index] = if index < seed { Side::A } else { Side::B };
            }
            order_a = (0..seed).rev().filter(|&i| kinds[i].is_ordered()).collect();
            order_b = (seed + 1..kinds.len())
                .filter(|&i| kinds[i].is_ordered())
                .collect();
        }
        _ if policy.in_order => {
            for (index, kind) in kinds.iter().enumerate() {
                if !kind.is_ordered() {
                    continue;
                }
                match resolved[index] {
                    Side::B => order_b.push(index),
                    Side::A | Side::Either => order_a.push(index),
                }
            }
        }
        _ => {}
    }

    ResolvedRules {
        sides: resolved,
        order_a,
        order_b,
    }
}

/// Verify `rules` against `policy` and the region registry.
pub fn compile(
    regions: &RegionRegistry,
    rules: &[Rule],
    policy: &PathwayPolicy,
) -> Result<CompiledPathway, PathwayError> {
    check_lengths(policy)?;
    if policy.seed_trials == 0 {
        return Err(PathwayError::InvalidSeedTrials);
    }

    for (index, rule) in rules.iter().enumerate() {
        if !regions.contains(rule.region) {
            return Err(PathwayError::MissingRegion {
                index,
                rule: rule.name(),
                region: rule.region,
            });
        }
        if !rule.kind.accepts_side() && rule.side != Side::Either {
            return Err(PathwayError::SidedSeed {
                index,
                rule: rule.name(),
            });
        }
    }

    let seeds: Vec<usize> = rules
        .iter()
        .enumerate()
        .filter(|(_, rule)| rule.kind == RuleKind::Seed)
        .map(|(index, _)| index)
        .collect();
    let seed = match seeds.as_slice() {
        [single] => Some(*single),
        [] => None,
        many => {
            warn!(
                seeds = many.len(),
                "several seed rules; seed logic disabled, seeds act as require_entry"
            );
            None
        }
    };
    let kinds: Vec<RuleKind> = rules
        .iter()
        .map(|rule| match rule.kind {
            RuleKind::Seed if seed.is_none() => RuleKind::RequireEntry,
            kind => kind,
        })
        .collect();

    if seed.is_none() {
        check_unseeded(rules, &kinds, policy)?;
    }
    if policy.skip_seed && !policy.one_sided {
        return Err(PathwayError::SkipSeedRequiresOneSided);
    }
    if policy.one_sided {
        if let Some((index, rule)) = rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.side != Side::Either)
        {
            return Err(PathwayError::OneSidedWithSides {
                index,
                rule: rule.name(),
            });
        }
    }

    let declared_sides: Vec<Side> = rules.iter().map(|rule| rule.side).collect();
    let explicit = declared_sides.iter().any(|side| *side != Side::Either);
    if seed.is_some() && policy.two_sided() && policy.in_order && explicit {
        if let Some(index) =
            (0..rules.len()).find(|&i| kinds[i].is_ordered() && rules[i].side == Side::Either)
        {
            return Err(PathwayError::MixedSides {
                index,
                rule: rules[index].name(),
            });
        }
    }

    let resolved = resolve_sides(&kinds, &declared_sides, seed, policy);

    let stop_flag = kinds.iter().any(|kind| kind.is_stop())
        || policy.one_sided
        || policy.skip_seed
        || (policy.at_max_length() == AtMaxLength::Stop && policy.has_max_length())
        || (seed.is_some() && explicit);

    let mode = if !stop_flag && !policy.in_order {
        TraversalMode::FastPath
    } else if seed.is_none() {
        TraversalMode::Unseeded
    } else if policy.one_sided {
        TraversalMode::SeededOneSided
    } else {
        TraversalMode::SeededTwoSided
    };

    let compiled_rules = rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            let side = resolved.sides[index];
            let order_slot = match side {
                Side::B => resolved.order_b.iter().position(|&i| i == index),
                Side::A | Side::Either => resolved.order_a.iter().position(|&i| i == index),
            };
            let region = regions
                .get(rule.region)
                .cloned()
                .ok_or(PathwayError::MissingRegion {
                    index,
                    rule: rule.name(),
                    region: rule.region,
                })?;
            Ok(CompiledRule {
                index,
                declared: rule.kind,
                kind: kinds[index],
                side,
                region_id: rule.region,
                region,
                order_slot,
            })
        })
        .collect::<Result<Vec<_>, PathwayError>>()?;

    let compiled = CompiledPathway {
        rules: compiled_rules,
        seed,
        stop_flag,
        order_a: resolved.order_a,
        order_b: resolved.order_b,
        min_length: policy.min_length,
        max_length: policy.max_length_or_inf(),
        at_max_length: policy.at_max_length(),
        mode,
        policy: policy.clone(),
    };
    debug!(summary = %compiled.summary(), "pathway compiled");
    Ok(compiled)
}

fn check_lengths(policy: &PathwayPolicy) -> Result<(), PathwayError> {
    if !policy.min_length.is_finite() || policy.min_length < 0.0 {
        return Err(PathwayError::NegativeLength {
            what: "min_length",
            value: policy.min_length,
        });
    }
    if let Some(max) = policy.max_length {
        if max.is_nan() || max < 0.0 {
            return Err(PathwayError::NegativeLength {
                what: "max_length",
                value: max,
            });
        }
        if policy.min_length > max {
            return Err(PathwayError::MinExceedsMax {
                min: policy.min_length,
                max,
            });
        }
    }
    Ok(())
}

fn check_unseeded(
    rules: &[Rule],
    kinds: &[RuleKind],
    policy: &PathwayPolicy,
) -> Result<(), PathwayError> {
    for (index, rule) in rules.iter().enumerate() {
        let kind = kinds[index];
        if kind.is_stop() {
            return Err(PathwayError::StopWithoutSeed {
                index,
                rule: rule.name(),
            });
        }
        if kind == RuleKind::DiscardSeed {
            return Err(PathwayError::SeedFlagWithoutSeed {
                what: "discard_seed",
            });
        }
        if kind.is_tracked() && rule.side != Side::Either {
            return Err(PathwayError::SidedRuleWithoutSeed {
                index,
                rule: rule.name(),
            });
        }
        if kind.is_end_rule() && rule.side == Side::Either {
            return Err(PathwayError::EndRuleWithoutSide {
                index,
                rule: rule.name(),
            });
        }
    }
    if policy.one_sided {
        return Err(PathwayError::SeedFlagWithoutSeed { what: "one_sided" });
    }
    if policy.skip_seed {
        return Err(PathwayError::SeedFlagWithoutSeed { what: "skip_seed" });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Point3;

    fn registry() -> (RegionRegistry, RegionId, RegionId, RegionId) {
        let mut regions = RegionRegistry::new();
        let a = regions.sphere(Point3::ORIGIN, 1.0).expect("a");
        let b = regions.sphere(Point3::new(10.0, 0.0, 0.0), 1.0).expect("b");
        let c = regions.sphere(Point3::new(20.0, 0.0, 0.0), 1.0).expect("c");
        (regions, a, b, c)
    }

    #[test]
    fn no_rules_compile_to_fast_path() {
        let (regions, ..) = registry();
        let compiled = compile(&regions, &[], &PathwayPolicy::default()).expect("compile");
        assert_eq!(compiled.mode, TraversalMode::FastPath);
        assert!(!compiled.stop_flag);
        assert!(compiled.max_length.is_infinite());
    }

    #[test]
    fn stop_rule_without_seed_is_rejected() {
        let (regions, a, ..) = registry();
        let err = compile(
            &regions,
            &[Rule::new(RuleKind::StopAtExit, a)],
            &PathwayPolicy::default(),
        )
        .expect_err("stop without seed");
        assert!(matches!(err, PathwayError::StopWithoutSeed { index: 0, .. }));
    }

    #[test]
    fn sided_require_without_seed_is_rejected() {
        let (regions, a, ..) = registry();
        let err = compile(
            &regions,
            &[Rule::sided(RuleKind::RequireEntry, Side::A, a)],
            &PathwayPolicy::default(),
        )
        .expect_err("sided without seed");
        assert!(matches!(err, PathwayError::SidedRuleWithoutSeed { .. }));
        assert!(err.to_string().contains("require_entry_A"));
    }

    #[test]
    fn unsided_end_rule_without_seed_is_rejected() {
        let (regions, a, ..) = registry();
        let err = compile(
            &regions,
            &[Rule::new(RuleKind::DiscardIfEndsInside, a)],
            &PathwayPolicy::default(),
        )
        .expect_err("end rule without side");
        assert!(matches!(err, PathwayError::EndRuleWithoutSide { .. }));
        compile(
            &regions,
            &[Rule::sided(RuleKind::DiscardIfEndsInside, Side::B, a)],
            &PathwayPolicy::default(),
        )
        .expect("sided end rule is fine");
    }

    #[test]
    fn policy_errors_are_reported() {
        let (regions, a, ..) = registry();
        let seed = [Rule::new(RuleKind::Seed, a)];
        let cases = [
            (
                PathwayPolicy {
                    min_length: -1.0,
                    ..PathwayPolicy::default()
                },
                "min_length",
            ),
            (
                PathwayPolicy {
                    min_length: 5.0,
                    max_length: Some(4.0),
                    ..PathwayPolicy::default()
                },
                "exceeds",
            ),
            (
                PathwayPolicy {
                    skip_seed: true,
                    ..PathwayPolicy::default()
                },
                "skip_seed requires one_sided",
            ),
            (
                PathwayPolicy {
                    seed_trials: 0,
                    ..PathwayPolicy::default()
                },
                "seed_trials",
            ),
        ];
        for (policy, needle) in cases {
            let err = compile(&regions, &seed, &policy).expect_err(needle);
            assert!(err.to_string().contains(needle), "{err} lacks {needle}");
        }
        let err = compile(
            &regions,
            &[],
            &PathwayPolicy {
                one_sided: true,
                ..PathwayPolicy::default()
            },
        )
        .expect_err("one_sided without seed");
        assert_eq!(err, PathwayError::SeedFlagWithoutSeed { what: "one_sided" });
    }

    #[test]
    fn one_sided_rejects_explicit_sides() {
        let (regions, a, b, _) = registry();
        let err = compile(
            &regions,
            &[
                Rule::new(RuleKind::Seed, a),
                Rule::sided(RuleKind::RequireEntry, Side::B, b),
            ],
            &PathwayPolicy {
                one_sided: true,
                ..PathwayPolicy::default()
            },
        )
        .expect_err("sided in one-sided mode");
        assert!(matches!(err, PathwayError::OneSidedWithSides { index: 1, .. }));
    }

    #[test]
    fn in_order_pulls_sides_around_the_seed() {
        let kinds = [
            RuleKind::RequireEntry,
            RuleKind::RequireExit,
            RuleKind::Seed,
            RuleKind::RequireEntry,
            RuleKind::DiscardIfEnters,
            RuleKind::RequireEntry,
        ];
        let sides = [Side::Either; 6];
        let policy = PathwayPolicy {
            in_order: true,
            ..PathwayPolicy::default()
        };
        let resolved = resolve_sides(&kinds, &sides, Some(2), &policy);
        assert_eq!(
            resolved.sides,
            vec![Side::A, Side::A, Side::Either, Side::B, Side::B, Side::B]
        );
        assert_eq!(resolved.order_a, vec![1, 0]);
        assert_eq!(resolved.order_b, vec![3, 5]);
    }

    #[test]
    fn pulling_is_skipped_with_explicit_sides_or_one_sided() {
        let kinds = [RuleKind::RequireEntry, RuleKind::Seed, RuleKind::RequireEntry];
        let in_order = PathwayPolicy {
            in_order: true,
            ..PathwayPolicy::default()
        };
        let resolved = resolve_sides(&kinds, &[Side::B, Side::Either, Side::A], Some(1), &in_order);
        assert_eq!(resolved.sides, vec![Side::B, Side::Either, Side::A]);
        assert_eq!(resolved.order_a, vec![2]);
        assert_eq!(resolved.order_b, vec![0]);

        let one_sided = PathwayPolicy {
            one_sided: true,
            ..in_order
        };
        let resolved = resolve_sides(&kinds, &[Side::Either; 3], Some(1), &one_sided);
        assert_eq!(resolved.sides, vec![Side::Either; 3]);
        assert_eq!(resolved.order_a, vec![0, 2]);
        assert!(resolved.order_b.is_empty());
    }

    #[test]
    fn mixed_sides_in_order_are_rejected() {
        let (regions, a, b, c) = registry();
        let err = compile(
            &regions,
            &[
                Rule::new(RuleKind::Seed, a),
                Rule::sided(RuleKind::RequireEntry, Side::A, b),
                Rule::new(RuleKind::RequireEntry, c),
            ],
            &PathwayPolicy {
                in_order: true,
                ..PathwayPolicy::default()
            },
        )
        .expect_err("mixed");
        assert!(matches!(err, PathwayError::MixedSides { index: 2, .. }));
    }

    #[test]
    fn several_seeds_disable_seed_logic() {
        let (regions, a, b, _) = registry();
        let compiled = compile(
            &regions,
            &[Rule::new(RuleKind::Seed, a), Rule::new(RuleKind::Seed, b)],
            &PathwayPolicy::default(),
        )
        .expect("compile");
        assert!(compiled.seed.is_none());
        assert!(
            compiled
                .rules
                .iter()
                .all(|rule| rule.kind == RuleKind::RequireEntry)
        );
    }

    #[test]
    fn modes_follow_stop_flag_and_seed() {
        let (regions, a, b, _) = registry();
        let seeded_stop = compile(
            &regions,
            &[
                Rule::new(RuleKind::Seed, a),
                Rule::new(RuleKind::StopAtExit, b),
            ],
            &PathwayPolicy::default(),
        )
        .expect("compile");
        assert!(seeded_stop.stop_flag);
        assert_eq!(seeded_stop.mode, TraversalMode::SeededTwoSided);

        let unseeded_order = compile(
            &regions,
            &[
                Rule::new(RuleKind::RequireEntry, a),
                Rule::new(RuleKind::RequireEntry, b),
            ],
            &PathwayPolicy {
                in_order: true,
                ..PathwayPolicy::default()
            },
        )
        .expect("compile");
        assert_eq!(unseeded_order.mode, TraversalMode::Unseeded);
        assert_eq!(unseeded_order.order_a, vec![0, 1]);
        assert_eq!(unseeded_order.rules[1].order_slot, Some(1));

        let one_sided = compile(
            &regions,
            &[Rule::new(RuleKind::Seed, a)],
            &PathwayPolicy {
                one_sided: true,
                ..PathwayPolicy::default()
            },
        )
        .expect("compile");
        assert_eq!(one_sided.mode, TraversalMode::SeededOneSided);
    }
}
