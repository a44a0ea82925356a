//! Single-node consolidation: remove or replace the cheapest-to-disrupt
//! node that can be consolidated on its own.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::budget::DisruptionBudgets;
use crate::candidate::Candidate;
use crate::command::Command;
use crate::config::DisruptionConfig;
use crate::consolidation::Consolidation;
use crate::error::DisruptionResult;
use crate::method::{Collaborators, Method, Reason};

pub struct SingleNodeConsolidation {
    consolidation: Consolidation,
    timeout: Duration,
}

impl SingleNodeConsolidation {
    pub fn new(collaborators: Collaborators, config: &DisruptionConfig) -> Self {
        Self {
            consolidation: Consolidation::new(collaborators, config),
            timeout: config.single_node_timeout,
        }
    }
}

impl Method for SingleNodeConsolidation {
    fn should_disrupt(&self, candidate: &Candidate) -> bool {
        self.consolidation.should_disrupt(candidate)
    }

    /// Walks candidates in cost order and returns the first non-empty
    /// command. Budgets are checked, not consumed; one command disrupts
    /// one node.
    fn compute_command(
        &mut self,
        budgets: &mut DisruptionBudgets,
        candidates: &[Arc<Candidate>],
    ) -> DisruptionResult<Command> {
        if self.consolidation.is_consolidated() {
            return Ok(Command::none());
        }
        let candidates = self.consolidation.sort_and_filter_candidates(candidates)?;
        let collaborators = &self.consolidation.collaborators;
        collaborators.metrics.set_eligible_nodes(
            self.reason().as_str(),
            self.consolidation_type(),
            candidates.len(),
        );

        let started = collaborators.clock.now();
        let mut constrained_by_budgets = false;

        for (evaluated, candidate) in candidates.iter().enumerate() {
            if !budgets.has_budget(&candidate.node_pool().name) {
                constrained_by_budgets = true;
                continue;
            }

            let elapsed = collaborators
                .clock
                .now()
                .duration_since(started)
                .unwrap_or_default();
            if elapsed > self.timeout {
                warn!(
                    evaluated,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "abandoning single-node consolidation due to timeout"
                );
                return Ok(Command::none());
            }

            let command = match self
                .consolidation
                .compute_consolidation(std::slice::from_ref(candidate))
            {
                Ok(command) => command,
                Err(e) => {
                    error!(node = %candidate.name(), error = %e, "computing consolidation");
                    continue;
                }
            };
            if !command.is_empty() {
                debug!(command = %command, "single-node consolidation found a command");
                return Ok(command);
            }
        }

        if !constrained_by_budgets {
            self.consolidation.mark_consolidated();
        }
        Ok(Command::none())
    }

    fn reason(&self) -> Reason {
        Reason::Underutilized
    }

    fn consolidation_type(&self) -> &'static str {
        "single"
    }
}
