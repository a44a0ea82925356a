//! Multi-node consolidation.
//!
//! Takes the cheapest-to-disrupt candidates (within budget) and binary
//! searches for the largest prefix that can be removed outright or
//! replaced by one cheaper node.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::budget::DisruptionBudgets;
use crate::candidate::Candidate;
use crate::command::{Command, Decision};
use crate::config::DisruptionConfig;
use crate::consolidation::Consolidation;
use crate::error::{DisruptionError, DisruptionResult};
use crate::instance_type::InstanceTypeOptions;
use crate::method::{Collaborators, Method, Reason};
use crate::simulator::NodeClaimTemplate;

pub struct MultiNodeConsolidation {
    consolidation: Consolidation,
    timeout: Duration,
    max_candidates: usize,
}

impl MultiNodeConsolidation {
    pub fn new(collaborators: Collaborators, config: &DisruptionConfig) -> Self {
        Self {
            consolidation: Consolidation::new(collaborators, config),
            timeout: config.multi_node_timeout,
            max_candidates: config.multi_node_max_candidates,
        }
    }

    /// Binary search over prefixes of `candidates` for the largest one
    /// that yields a usable command. Prefixes always hold at least two
    /// candidates.
    fn first_n_consolidation_option(&self, candidates: &[Arc<Candidate>]) -> DisruptionResult<Command> {
        if candidates.len() < 2 {
            return Ok(Command::none());
        }
        let clock = &self.consolidation.collaborators.clock;
        let started = clock.now();

        // `min` and `max` are indices of the last candidate in the prefix.
        let mut min = 1;
        let mut max = candidates.len() - 1;
        let mut last_saved = Command::none();

        while min <= max {
            let elapsed = clock.now().duration_since(started).unwrap_or_default();
            if elapsed > self.timeout {
                if last_saved.is_empty() {
                    warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        "abandoning multi-node consolidation due to timeout"
                    );
                } else {
                    warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        candidates = last_saved.candidates.len(),
                        "stopping multi-node consolidation due to timeout, returning last valid command"
                    );
                }
                return Ok(last_saved);
            }

            let mid = (min + max) / 2;
            let prefix = &candidates[..=mid];
            let mut command = self.consolidation.compute_consolidation(prefix)?;

            // A replacement sharing a type with a removed node must beat
            // that node's price.
            let mut replacement_has_options = false;
            if command.decision() == Decision::Replace {
                let options = filter_out_same_type(&command.replacements[0], prefix)?;
                replacement_has_options = !options.is_empty();
                command.replacements[0].instance_type_options = options;
            }

            if replacement_has_options || command.decision() == Decision::Delete {
                last_saved = command;
                min = mid + 1;
            } else {
                max = mid - 1;
            }
        }
        Ok(last_saved)
    }
}

impl Method for MultiNodeConsolidation {
    fn should_disrupt(&self, candidate: &Candidate) -> bool {
        self.consolidation.should_disrupt(candidate)
    }

    fn compute_command(
        &mut self,
        budgets: &mut DisruptionBudgets,
        candidates: &[Arc<Candidate>],
    ) -> DisruptionResult<Command> {
        if self.consolidation.is_consolidated() {
            return Ok(Command::none());
        }
        let candidates = self.consolidation.sort_and_filter_candidates(candidates)?;
        self.consolidation.collaborators.metrics.set_eligible_nodes(
            self.reason().as_str(),
            self.consolidation_type(),
            candidates.len(),
        );

        let mut constrained_by_budgets = false;
        let mut disruptable = Vec::with_capacity(candidates.len().min(self.max_candidates));
        for candidate in &candidates {
            if disruptable.len() == self.max_candidates {
                break;
            }
            if budgets.try_consume(&candidate.node_pool().name) {
                disruptable.push(Arc::clone(candidate));
            } else {
                constrained_by_budgets = true;
            }
        }

        let command = self.first_n_consolidation_option(&disruptable)?;
        if command.is_empty() {
            if !constrained_by_budgets {
                self.consolidation.mark_consolidated();
            }
        } else {
            debug!(command = %command, "multi-node consolidation found a command");
        }
        Ok(command)
    }

    fn reason(&self) -> Reason {
        Reason::Underutilized
    }

    fn consolidation_type(&self) -> &'static str {
        "multi"
    }
}

/// Options of `replacement` strictly cheaper than the cheapest removed
/// candidate whose instance type also appears among the options.
pub fn filter_out_same_type(
    replacement: &NodeClaimTemplate,
    candidates: &[Arc<Candidate>],
) -> DisruptionResult<InstanceTypeOptions> {
    let mut cheapest_by_type: HashMap<&str, f64> = HashMap::new();

    for candidate in candidates {
        let instance_type = candidate.instance_type();
        let offering = instance_type
            .offerings
            .get(candidate.capacity_type(), candidate.zone())
            .ok_or_else(|| DisruptionError::MissingOffering {
                instance_type: instance_type.name.clone(),
                capacity_type: candidate.capacity_type(),
                zone: candidate.zone().to_string(),
            })?;
        let price = cheapest_by_type
            .entry(instance_type.name.as_str())
            .or_insert(f64::MAX);
        if offering.price < *price {
            *price = offering.price;
        }
    }

    let max_price = replacement
        .instance_type_options
        .iter()
        .filter_map(|it| cheapest_by_type.get(it.name.as_str()).copied())
        .fold(f64::MAX, f64::min);

    Ok(replacement
        .instance_type_options
        .filter_by_price(&replacement.requirements, max_price))
}
