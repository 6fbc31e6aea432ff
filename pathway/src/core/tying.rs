//! Require/discard/order checks at a halted end.

use crate::core::geometry::Point3;
use crate::core::rules::RuleKind;
use crate::core::tolerance::LENGTH_EPS;
use crate::core::types::{DiscardReason, Side};
use crate::core::walker::{Walker, side_slot};

impl Walker<'_> {
    /// End rules for the end labelled `label`.
    ///
    /// `discard_if_ends_inside` needs the end clearly inside (not on the
    /// boundary); `require_end_inside` accepts the boundary. A side-specific
    /// `require_end_inside` that is not met discards immediately; an unsided one
    /// may still be met at the other end.
    pub fn tie_end(&mut self, end: Point3, label: Side) -> Result<(), DiscardReason> {
        let pathway = self.pathway;
        for (index, rule) in pathway.rules.iter().enumerate() {
            if !rule.side.applies_to(label) {
                continue;
            }
            match rule.kind {
                RuleKind::DiscardIfEndsInside => {
                    if rule.region.is_inside(end)
                        && !rule.region.is_near_boundary(end, LENGTH_EPS)
                    {
                        return Err(DiscardReason::EndedInsideDiscardRoi);
                    }
                }
                RuleKind::RequireEndInside => {
                    if rule.region.is_inside(end) || rule.region.is_near_boundary(end, LENGTH_EPS)
                    {
                        self.states[index].done = true;
                    } else if rule.side == label {
                        return Err(DiscardReason::RequiredRoiNotMet);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// In-order check for `side`: every rule of its order list must be met.
    ///
    /// A missing rule that was reached out of turn reports
    /// `REQUIRED_ORDER_NOT_MET`; one never reached reports
    /// `REQUIRED_ROI_NOT_MET`.
    pub fn tie_order(&self, side: Side) -> Result<(), DiscardReason> {
        if !self.pathway.policy.in_order {
            return Ok(());
        }
        let order = self.pathway.order(side);
        let counter = self.counters[side_slot(side)];
        match order.get(counter) {
            None => Ok(()),
            Some(&missing) if self.states[missing].seen => {
                Err(DiscardReason::RequiredOrderNotMet)
            }
            Some(_) => Err(DiscardReason::RequiredRoiNotMet),
        }
    }

    /// Full tie of one side's end: end rules, then order.
    pub fn tie(&mut self, end: Point3, label: Side) -> Result<(), DiscardReason> {
        self.tie_end(end, label)?;
        self.tie_order(label)
    }

    /// Tie both ends of an unseeded streamline.
    ///
    /// Tries `first = A, last = B`; only if that fails are the labels
    /// exchanged. Returns whether the labels were exchanged.
    pub fn tie_unlabelled(&mut self, first: Point3, last: Point3) -> Result<bool, DiscardReason> {
        let snapshot = self.states.clone();
        let direct = self
            .tie_end(first, Side::A)
            .and_then(|()| self.tie_end(last, Side::B));
        let Err(reason) = direct else {
            return Ok(false);
        };
        self.states.clone_from(&snapshot);
        let swapped = self
            .tie_end(first, Side::B)
            .and_then(|()| self.tie_end(last, Side::A));
        match swapped {
            Ok(()) => Ok(true),
            Err(_) => {
                self.states = snapshot;
                Err(reason)
            }
        }
    }

    /// After both ends are tied every require rule must be met.
    pub fn check_requirements(&self) -> Result<(), DiscardReason> {
        let unmet = self
            .pathway
            .rules
            .iter()
            .zip(&self.states)
            .any(|(rule, state)| rule.kind.is_require() && !state.done);
        if unmet {
            Err(DiscardReason::RequiredRoiNotMet)
        } else {
            Ok(())
        }
    }
}
