//! Mutable rule list with cached verification.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::policy::PathwayPolicy;
use crate::core::region::RegionRegistry;
use crate::core::rules::Rule;
use crate::core::verify::{CompiledPathway, PathwayError, compile};

/// Declared rules, policy and regions of one pathway.
///
/// Every mutation re-verifies and is rolled back when verification fails, so
/// a `Pathway` is always in a verified state.
#[derive(Debug, Clone)]
pub struct Pathway {
    regions: RegionRegistry,
    rules: Vec<Rule>,
    policy: PathwayPolicy,
    compiled: Option<Arc<CompiledPathway>>,
}

impl Pathway {
    pub fn new(regions: RegionRegistry, policy: PathwayPolicy) -> Result<Self, PathwayError> {
        Self::from_rules(regions, Vec::new(), policy)
    }

    /// Compile a whole rule list at once.
    pub fn from_rules(
        regions: RegionRegistry,
        rules: Vec<Rule>,
        policy: PathwayPolicy,
    ) -> Result<Self, PathwayError> {
        let mut pathway = Self {
            regions,
            rules,
            policy,
            compiled: None,
        };
        pathway.verify()?;
        Ok(pathway)
    }

    pub fn regions(&self) -> &RegionRegistry {
        &self.regions
    }

    /// Mutable access to the registry. Adding regions never invalidates
    /// existing rules.
    pub fn regions_mut(&mut self) -> &mut RegionRegistry {
        &mut self.regions
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn policy(&self) -> &PathwayPolicy {
        &self.policy
    }

    /// Append a rule; on failure the rule list is left unchanged.
    pub fn add(&mut self, rule: Rule) -> Result<(), PathwayError> {
        self.rules.push(rule);
        self.compiled = None;
        if let Err(err) = self.verify() {
            self.rules.pop();
            return Err(self.rolled_back(err));
        }
        debug!(rule = %rule.name(), count = self.rules.len(), "rule added");
        Ok(())
    }

    /// Remove the rule at `index`; on failure it is reinserted.
    pub fn remove(&mut self, index: usize) -> Result<Rule, PathwayError> {
        if index >= self.rules.len() {
            return Err(PathwayError::IndexOutOfRange {
                index,
                len: self.rules.len(),
            });
        }
        let rule = self.rules.remove(index);
        self.compiled = None;
        if let Err(err) = self.verify() {
            self.rules.insert(index, rule);
            return Err(self.rolled_back(err));
        }
        debug!(rule = %rule.name(), index, "rule removed");
        Ok(rule)
    }

    /// Replace the policy; on failure the previous policy stays.
    pub fn set_policy(&mut self, policy: PathwayPolicy) -> Result<(), PathwayError> {
        let previous = std::mem::replace(&mut self.policy, policy);
        self.compiled = None;
        if let Err(err) = self.verify() {
            self.policy = previous;
            return Err(self.rolled_back(err));
        }
        Ok(())
    }

    /// Compiled view; repeated calls without mutation return the cached value.
    pub fn verify(&mut self) -> Result<Arc<CompiledPathway>, PathwayError> {
        if let Some(compiled) = &self.compiled {
            return Ok(Arc::clone(compiled));
        }
        let compiled = Arc::new(compile(&self.regions, &self.rules, &self.policy)?);
        self.compiled = Some(Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Cached compiled view without re-verifying.
    pub fn compiled(&self) -> Option<Arc<CompiledPathway>> {
        self.compiled.clone()
    }

    /// Re-verify the restored state, keeping `err` as the reported failure.
    fn rolled_back(&mut self, err: PathwayError) -> PathwayError {
        self.compiled = None;
        match self.verify() {
            Ok(_) => err,
            Err(restore) => {
                warn!(error = %err, restore = %restore, "restored pathway no longer verifies");
                PathwayError::RestoreFailed {
                    error: Box::new(err),
                    restore: Box::new(restore),
                }
            }
        }
    }
}
