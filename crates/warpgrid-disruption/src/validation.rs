//! Re-validation of a command after its TTL.
//!
//! A command is computed against a snapshot. Before it is executed the
//! cluster is read again and the command must still hold: every candidate
//! still exists, is not deleting, and is still eligible; the pools still
//! have budget for it; and the outcome it was built on still holds
//! (nodes still empty, or the same scheduling simulation result).

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::budget::DisruptionBudgets;
use crate::candidate::Candidate;
use crate::command::Command;
use crate::eligibility::{Exclusion, check_consolidation, check_emptiness};
use crate::error::{DisruptionError, SimulationError};
use crate::method::{Collaborators, Reason};

/// Why a command no longer holds.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("candidate {0} no longer exists")]
    CandidateMissing(String),

    #[error("candidate {0} is being deleted")]
    CandidateDeleting(String),

    #[error("candidate {node} is no longer eligible ({exclusion:?})")]
    NotEligible { node: String, exclusion: Exclusion },

    #[error("disruption budget for node pool {0} is exhausted")]
    BudgetExhausted(String),

    #[error("candidate {0} is no longer empty")]
    NotEmpty(String),

    #[error("pods no longer schedule: {0}")]
    Unschedulable(String),

    #[error("scheduling simulation changed: {0}")]
    SimulationChanged(String),

    #[error(transparent)]
    Disruption(#[from] DisruptionError),
}

pub struct Validation {
    collaborators: Collaborators,
}

impl Validation {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    /// Check `command`, computed for `reason`, against fresh cluster state.
    pub fn validate(&self, command: &Command, reason: Reason) -> Result<(), ValidationError> {
        if command.is_empty() {
            return Ok(());
        }
        let cluster = &self.collaborators.cluster;
        let fresh: HashMap<String, Arc<Candidate>> = cluster
            .candidates()
            .into_iter()
            .map(|c| (c.name().to_string(), c))
            .collect();
        let now = self.collaborators.clock.now();

        let mut current = Vec::with_capacity(command.candidates.len());
        for candidate in &command.candidates {
            let Some(latest) = fresh.get(candidate.name()) else {
                return Err(ValidationError::CandidateMissing(candidate.name().to_string()));
            };
            if latest.is_deleting() {
                return Err(ValidationError::CandidateDeleting(latest.name().to_string()));
            }
            let eligible = match reason {
                Reason::Empty => check_emptiness(latest, now),
                Reason::Underutilized => check_consolidation(latest),
            };
            eligible.map_err(|exclusion| ValidationError::NotEligible {
                node: latest.name().to_string(),
                exclusion,
            })?;
            current.push(Arc::clone(latest));
        }

        let mut budgets = DisruptionBudgets::build(&cluster.node_pools(), &cluster.pool_usage());
        for candidate in &current {
            let pool = &candidate.node_pool().name;
            if !budgets.try_consume(pool) {
                return Err(ValidationError::BudgetExhausted(pool.clone()));
            }
        }

        match reason {
            Reason::Empty => {
                if let Some(busy) = current.iter().find(|c| !c.pods().is_empty()) {
                    return Err(ValidationError::NotEmpty(busy.name().to_string()));
                }
                Ok(())
            }
            Reason::Underutilized => self.validate_simulation(command, &current),
        }
    }

    fn validate_simulation(
        &self,
        command: &Command,
        current: &[Arc<Candidate>],
    ) -> Result<(), ValidationError> {
        let results = match self.collaborators.simulator.simulate(current) {
            Ok(results) => results,
            Err(SimulationError::CandidateDeleting(node)) => {
                return Err(ValidationError::CandidateDeleting(node));
            }
            Err(e) => return Err(DisruptionError::from(e).into()),
        };

        if !results.all_non_pending_pods_scheduled() {
            return Err(ValidationError::Unschedulable(
                results.non_pending_pod_scheduling_errors(),
            ));
        }

        match (results.new_node_claims.as_slice(), command.replacements.as_slice()) {
            ([], []) => Ok(()),
            ([], [_, ..]) => Err(ValidationError::SimulationChanged(
                "a replacement is no longer needed".to_string(),
            )),
            ([simulated], [planned, ..]) => {
                if planned
                    .instance_type_options
                    .intersects(&simulated.instance_type_options)
                {
                    Ok(())
                } else {
                    Err(ValidationError::SimulationChanged(
                        "replacement instance types no longer match".to_string(),
                    ))
                }
            }
            ([_], []) => Err(ValidationError::SimulationChanged(
                "deleting now requires a replacement".to_string(),
            )),
            (claims, _) => Err(ValidationError::SimulationChanged(format!(
                "simulation now requires {} new nodes",
                claims.len()
            ))),
        }
    }
}
