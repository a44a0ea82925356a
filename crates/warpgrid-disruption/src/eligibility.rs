//! Eligibility rules shared by the disruption methods.
//!
//! Rules are checked in order and the first match excludes the candidate:
//!
//! 1. the candidate carries the do-not-consolidate annotation;
//! 2. the pool's consolidation policy is not the method's policy;
//! 3. the pool sets `consolidate_after` to `Never`;
//! 4. (emptiness only) the node is not `Empty`, or has not been empty for
//!    the pool's cooldown.
//!
//! Some exclusions are worth telling the user about; policy mismatches and
//! cooldowns are expected and high-volume, so they stay silent.

use std::time::SystemTime;

use crate::candidate::Candidate;
use crate::clock::from_epoch_secs;
use crate::types::{ConditionType, ConsolidateAfter, ConsolidationPolicy, DO_NOT_CONSOLIDATE_ANNOTATION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    DoNotConsolidate,
    PolicyMismatch,
    ConsolidationDisabled,
    /// `WhenEmpty` pool without any `consolidate_after`.
    CooldownUnset,
    NotEmpty,
    CooldownPending,
}

impl Exclusion {
    /// Message for an explanatory event, or `None` for silent exclusions.
    pub fn user_message(&self, candidate: &Candidate) -> Option<String> {
        match self {
            Exclusion::DoNotConsolidate => {
                Some(format!("{DO_NOT_CONSOLIDATE_ANNOTATION} annotation exists"))
            }
            Exclusion::ConsolidationDisabled => Some(format!(
                "NodePool {:?} has consolidation disabled",
                candidate.node_pool().name
            )),
            Exclusion::PolicyMismatch
            | Exclusion::CooldownUnset
            | Exclusion::NotEmpty
            | Exclusion::CooldownPending => None,
        }
    }
}

fn check_common(candidate: &Candidate, policy: ConsolidationPolicy) -> Result<(), Exclusion> {
    if candidate
        .annotations()
        .get(DO_NOT_CONSOLIDATE_ANNOTATION)
        .is_some_and(|v| v == "true")
    {
        return Err(Exclusion::DoNotConsolidate);
    }
    let disruption = &candidate.node_pool().disruption;
    if disruption.consolidation_policy != Some(policy) {
        return Err(Exclusion::PolicyMismatch);
    }
    if disruption.consolidate_after == Some(ConsolidateAfter::Never) {
        return Err(Exclusion::ConsolidationDisabled);
    }
    Ok(())
}

/// Rules for the `WhenUnderutilized` methods.
pub fn check_consolidation(candidate: &Candidate) -> Result<(), Exclusion> {
    check_common(candidate, ConsolidationPolicy::WhenUnderutilized)
}

/// Rules for the `WhenEmpty` method, evaluated at `now`.
pub fn check_emptiness(candidate: &Candidate, now: SystemTime) -> Result<(), Exclusion> {
    check_common(candidate, ConsolidationPolicy::WhenEmpty)?;

    let Some(cooldown) = candidate
        .node_pool()
        .disruption
        .consolidate_after
        .and_then(|after| after.duration())
    else {
        return Err(Exclusion::CooldownUnset);
    };

    let Some(empty) = candidate
        .condition(ConditionType::Empty)
        .filter(|c| c.status)
    else {
        return Err(Exclusion::NotEmpty);
    };

    if now < from_epoch_secs(empty.last_transition_time) + cooldown {
        return Err(Exclusion::CooldownPending);
    }
    Ok(())
}
