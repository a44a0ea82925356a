//! Emptiness: delete nodes that have run no workloads for the pool's
//! `consolidate_after` cooldown.
//!
//! Emptiness never launches capacity, so its commands are always
//! delete-only, and it needs no scheduling simulation.

use std::sync::Arc;

use tracing::debug;

use crate::budget::DisruptionBudgets;
use crate::candidate::Candidate;
use crate::clock::Clock;
use crate::command::Command;
use crate::eligibility::check_emptiness;
use crate::error::DisruptionResult;
use crate::events::{Event, Recorder};
use crate::method::{Method, Reason};
use crate::metrics::DisruptionMetrics;

pub struct Emptiness {
    clock: Arc<dyn Clock>,
    recorder: Arc<dyn Recorder>,
    metrics: Arc<DisruptionMetrics>,
}

impl Emptiness {
    pub fn new(
        clock: Arc<dyn Clock>,
        recorder: Arc<dyn Recorder>,
        metrics: Arc<DisruptionMetrics>,
    ) -> Self {
        Self {
            clock,
            recorder,
            metrics,
        }
    }
}

impl Method for Emptiness {
    fn should_disrupt(&self, candidate: &Candidate) -> bool {
        match check_emptiness(candidate, self.clock.now()) {
            Ok(()) => true,
            Err(exclusion) => {
                if let Some(message) = exclusion.user_message(candidate) {
                    self.recorder
                        .publish(Event::unconsolidatable(candidate, message));
                }
                false
            }
        }
    }

    fn compute_command(
        &mut self,
        budgets: &mut DisruptionBudgets,
        candidates: &[Arc<Candidate>],
    ) -> DisruptionResult<Command> {
        self.metrics.set_eligible_nodes(
            self.reason().as_str(),
            self.consolidation_type(),
            candidates.len(),
        );

        let mut empty = Vec::new();
        for candidate in candidates
            .iter()
            .filter(|c| !c.is_deleting() && c.pods().is_empty())
        {
            if budgets.try_consume(&candidate.node_pool().name) {
                empty.push(Arc::clone(candidate));
            } else {
                debug!(
                    node = %candidate.name(),
                    pool = %candidate.node_pool().name,
                    "disruption budget exhausted, skipping empty node"
                );
            }
        }

        Ok(Command::delete(empty))
    }

    fn reason(&self) -> Reason {
        Reason::Empty
    }

    fn consolidation_type(&self) -> &'static str {
        ""
    }
}
