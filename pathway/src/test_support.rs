//! Test-only helpers for building geometry and pathways.

use std::sync::Arc;

use crate::core::geometry::Point3;
use crate::core::orchestrator::Evaluator;
use crate::core::pathway::Pathway;
use crate::core::policy::PathwayPolicy;
use crate::core::region::{Region, RegionRegistry};
use crate::core::rules::{Rule, RuleName};
use crate::core::streamline::Streamline;

/// Point on the x axis.
pub fn x(value: f64) -> Point3 {
    Point3::new(value, 0.0, 0.0)
}

/// `n` evenly spaced vertices from `from` to `to` inclusive.
pub fn line(from: Point3, to: Point3, n: usize) -> Streamline {
    assert!(n >= 2, "a line needs two vertices");
    (0..n)
        .map(|i| from.lerp(to, i as f64 / (n - 1) as f64))
        .collect()
}

/// Polyline through the given coordinates.
pub fn polyline(points: &[[f64; 3]]) -> Streamline {
    points
        .iter()
        .map(|&[x, y, z]| Point3::new(x, y, z))
        .collect()
}

/// Incrementally declared rules plus a policy.
#[derive(Debug, Default)]
pub struct PathwayBuilder {
    regions: RegionRegistry,
    rules: Vec<Rule>,
    policy: PathwayPolicy,
}

impl PathwayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule by configuration name (`stop_at_exit_B`, ...).
    pub fn sphere(mut self, name: &str, center: Point3, radius: f64) -> Self {
        let name: RuleName = name.parse().expect("rule name");
        let region = self.regions.sphere(center, radius).expect("sphere");
        self.rules.push(Rule::sided(name.kind, name.side, region));
        self
    }

    /// Add a rule over any region, registered under `key`.
    pub fn region(mut self, name: &str, key: &str, region: Arc<dyn Region>) -> Self {
        let name: RuleName = name.parse().expect("rule name");
        let region = self.regions.insert(key, region);
        self.rules.push(Rule::sided(name.kind, name.side, region));
        self
    }

    pub fn policy(mut self, policy: PathwayPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Pathway {
        Pathway::from_rules(self.regions, self.rules, self.policy).expect("verify pathway")
    }

    pub fn evaluator(self) -> Evaluator {
        Evaluator::new(self.build().compiled().expect("compiled"))
    }
}
