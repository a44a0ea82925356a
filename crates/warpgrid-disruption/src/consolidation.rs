//! Consolidation: replace or remove underutilized nodes.
//!
//! `Consolidation` holds the logic shared by single-node and multi-node
//! consolidation: candidate ordering, the "nothing changed" fingerprint,
//! eligibility, and `compute_consolidation`, which turns a simulation of
//! removing a candidate set into a command.
//!
//! # Decision
//!
//! ```text
//! simulate(candidates)
//!   candidate deleting           -> no-op, retry next pass
//!   pods unschedulable           -> abandon
//!   0 new nodes                  -> delete
//!   >1 new nodes                 -> abandon
//!   1 new node, all spot -> spot -> spot-to-spot strategy
//!   1 new node                   -> replace with strictly cheaper types
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::candidate::Candidate;
use crate::cluster::ConsolidationState;
use crate::command::Command;
use crate::config::DisruptionConfig;
use crate::eligibility::check_consolidation;
use crate::error::{DisruptionError, DisruptionResult, SimulationError};
use crate::events::Event;
use crate::instance_type::CapacityType;
use crate::method::{Collaborators, Reason};
use crate::requirements::{CAPACITY_TYPE_LABEL, Requirement};

/// Delay between computing a consolidation command and validating that
/// it still holds.
pub const CONSOLIDATION_TTL: Duration = Duration::from_secs(15);

pub struct Consolidation {
    pub(crate) collaborators: Collaborators,
    spot_to_spot_enabled: bool,
    last_consolidation_state: Option<ConsolidationState>,
}

impl Consolidation {
    pub fn new(collaborators: Collaborators, config: &DisruptionConfig) -> Self {
        Self {
            collaborators,
            spot_to_spot_enabled: config.feature_gates.spot_to_spot_consolidation,
            last_consolidation_state: None,
        }
    }

    /// Drop candidates that are known not to be options and order the
    /// rest by ascending disruption cost.
    pub fn sort_and_filter_candidates(
        &self,
        candidates: &[Arc<Candidate>],
    ) -> DisruptionResult<Vec<Arc<Candidate>>> {
        let mut candidates = self.collaborators.filter.filter(candidates.to_vec())?;
        candidates.sort_by(|a, b| a.disruption_cost().total_cmp(&b.disruption_cost()));
        Ok(candidates)
    }

    /// True if nothing has changed since `mark_consolidated`.
    pub fn is_consolidated(&self) -> bool {
        self.last_consolidation_state == Some(self.collaborators.cluster.consolidation_state())
    }

    /// Record the current cluster state as fully consolidated.
    pub fn mark_consolidated(&mut self) {
        self.last_consolidation_state = Some(self.collaborators.cluster.consolidation_state());
    }

    pub fn should_disrupt(&self, candidate: &Candidate) -> bool {
        match check_consolidation(candidate) {
            Ok(()) => true,
            Err(exclusion) => {
                if let Some(message) = exclusion.user_message(candidate) {
                    self.collaborators
                        .recorder
                        .publish(Event::unconsolidatable(candidate, message));
                }
                false
            }
        }
    }

    /// Compute the command that removes `candidates`, if one is worth it.
    pub fn compute_consolidation(&self, candidates: &[Arc<Candidate>]) -> DisruptionResult<Command> {
        if candidates.is_empty() {
            return Ok(Command::none());
        }

        let mut results = match self.collaborators.simulator.simulate(candidates) {
            Ok(results) => results,
            Err(SimulationError::CandidateDeleting(node)) => {
                debug!(node = %node, "candidate started deleting during simulation");
                return Ok(Command::none());
            }
            Err(e) => return Err(e.into()),
        };

        if !results.all_non_pending_pods_scheduled() {
            self.unconsolidatable(candidates, results.non_pending_pod_scheduling_errors());
            return Ok(Command::none());
        }

        // Everything fits on the remaining nodes.
        if results.new_node_claims.is_empty() {
            return Ok(Command::delete(candidates.to_vec()));
        }

        // Never turn nodes into more than one new node.
        if results.new_node_claims.len() != 1 {
            self.unconsolidatable(
                candidates,
                format!(
                    "Can't remove without creating {} candidates",
                    results.new_node_claims.len()
                ),
            );
            return Ok(Command::none());
        }

        let candidate_price = candidate_prices(candidates)?;
        let mut replacement = results.new_node_claims.remove(0);

        let all_existing_are_spot = candidates
            .iter()
            .all(|c| c.capacity_type() == CapacityType::Spot);
        if all_existing_are_spot
            && replacement
                .requirements
                .allows_capacity_type(CapacityType::Spot)
        {
            return self.compute_spot_to_spot_consolidation(candidates, replacement, candidate_price);
        }

        replacement.instance_type_options = replacement
            .instance_type_options
            .filter_by_price(&replacement.requirements, candidate_price);
        if replacement.instance_type_options.is_empty() {
            self.unconsolidatable(candidates, "Can't replace with a cheaper node");
            return Ok(Command::none());
        }

        // Prices above assumed a spot launch; never fall back to on-demand.
        let capacity_types = replacement.requirements.get(CAPACITY_TYPE_LABEL);
        if capacity_types.has(CapacityType::Spot.as_str())
            && capacity_types.has(CapacityType::OnDemand.as_str())
        {
            replacement
                .requirements
                .add(Requirement::capacity_types(&[CapacityType::Spot]));
        }

        Ok(Command::replace(candidates.to_vec(), replacement))
    }

    pub(crate) fn spot_to_spot_enabled(&self) -> bool {
        self.spot_to_spot_enabled
    }

    /// Report an abandoned candidate set. Only single-candidate sets are
    /// narrated to users.
    pub(crate) fn unconsolidatable(&self, candidates: &[Arc<Candidate>], message: impl Into<String>) {
        self.collaborators
            .metrics
            .record_abandoned(Reason::Underutilized.as_str());
        if let [candidate] = candidates {
            self.collaborators
                .recorder
                .publish(Event::unconsolidatable(candidate, message));
        }
    }
}

/// Sum of the current offering price of every candidate.
pub(crate) fn candidate_prices(candidates: &[Arc<Candidate>]) -> DisruptionResult<f64> {
    candidates.iter().try_fold(0.0, |sum, c| {
        c.instance_type()
            .offerings
            .get(c.capacity_type(), c.zone())
            .map(|offering| sum + offering.price)
            .ok_or_else(|| DisruptionError::MissingOffering {
                instance_type: c.instance_type().name.clone(),
                capacity_type: c.capacity_type(),
                zone: c.zone().to_string(),
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::DoNotDisruptFilter;
    use crate::simulator::{SchedulingResults, ScriptedSimulator};
    use crate::test_util::*;
    use crate::types::{DO_NOT_DISRUPT_ANNOTATION, Pod};

    fn consolidation(harness: &Harness, simulator: ScriptedSimulator) -> Consolidation {
        Consolidation::new(harness.collaborators(simulator), &DisruptionConfig::default())
    }

    #[test]
    fn zero_new_nodes_deletes_exactly_the_input() {
        let harness = Harness::new();
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 1);
        let b = harness.node("b", "m.large", CapacityType::OnDemand, 1);
        let sim = ScriptedSimulator::new().with(["a", "b"], Ok(SchedulingResults::default()));
        let consolidation = consolidation(&harness, sim);

        let cmd = consolidation.compute_consolidation(&[a.clone(), b.clone()]).unwrap();

        assert_eq!(cmd, Command::delete(vec![a, b]));
    }

    #[test]
    fn multiple_new_nodes_abandon_with_event() {
        let harness = Harness::new();
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 3);
        let results = SchedulingResults {
            new_node_claims: vec![
                replacement(vec![od_type("s.small", 0.1)], &[CapacityType::OnDemand]),
                replacement(vec![od_type("s.small", 0.1)], &[CapacityType::OnDemand]),
            ],
            pod_errors: Default::default(),
        };
        let consolidation = consolidation(&harness, ScriptedSimulator::new().with(["a"], Ok(results)));

        let cmd = consolidation.compute_consolidation(&[a]).unwrap();

        assert!(cmd.is_empty());
        assert_eq!(
            harness.recorder.messages(),
            vec!["Can't remove without creating 2 candidates".to_string()]
        );
    }

    #[test]
    fn unschedulable_pods_abandon() {
        let harness = Harness::new();
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 1);
        let results = SchedulingResults {
            new_node_claims: Vec::new(),
            pod_errors: [("default/a-0".to_string(), "insufficient memory".to_string())]
                .into_iter()
                .collect(),
        };
        let consolidation = consolidation(&harness, ScriptedSimulator::new().with(["a"], Ok(results)));

        assert!(consolidation.compute_consolidation(&[a]).unwrap().is_empty());
        assert_eq!(
            harness.recorder.messages(),
            vec!["pod default/a-0 can't be scheduled: insufficient memory".to_string()]
        );
        assert_eq!(harness.metrics.abandoned("underutilized"), 1);
    }

    #[test]
    fn multi_candidate_abandonment_is_not_narrated() {
        let harness = Harness::new();
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 1);
        let b = harness.node("b", "m.large", CapacityType::OnDemand, 1);
        let consolidation = consolidation(&harness, ScriptedSimulator::new());

        assert!(consolidation.compute_consolidation(&[a, b]).unwrap().is_empty());
        assert!(harness.recorder.events().is_empty());
    }

    #[test]
    fn deleting_candidate_is_a_silent_no_op() {
        let harness = Harness::new();
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 1);
        let sim = ScriptedSimulator::new().with(
            ["a"],
            Err(SimulationError::CandidateDeleting("a".to_string())),
        );
        let consolidation = consolidation(&harness, sim);

        let cmd = consolidation.compute_consolidation(&[a]).unwrap();
        assert!(cmd.is_empty());
        assert!(harness.recorder.events().is_empty());
    }

    #[test]
    fn other_simulation_failures_propagate() {
        let harness = Harness::new();
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 1);
        let sim = ScriptedSimulator::new().with(["a"], Err(SimulationError::Failed("boom".to_string())));
        let consolidation = consolidation(&harness, sim);

        let err = consolidation.compute_consolidation(&[a]).unwrap_err();
        assert!(matches!(err, DisruptionError::Simulation(SimulationError::Failed(_))));
    }

    #[test]
    fn replacement_keeps_only_strictly_cheaper_types() {
        let harness = Harness::new();
        // m.large on-demand costs 1.0
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 2);
        let options = vec![
            od_type("x.cheap", 0.5),
            od_type("x.equal", 1.0),
            od_type("x.pricey", 2.0),
            od_type("x.cheapest", 0.25),
        ];
        let results = SchedulingResults {
            new_node_claims: vec![replacement(options, &[CapacityType::OnDemand])],
            pod_errors: Default::default(),
        };
        let consolidation = consolidation(&harness, ScriptedSimulator::new().with(["a"], Ok(results)));

        let cmd = consolidation.compute_consolidation(&[a]).unwrap();

        assert_eq!(cmd.replacements.len(), 1);
        assert_eq!(
            cmd.replacements[0].instance_type_options.names(),
            vec!["x.cheapest", "x.cheap"]
        );
    }

    #[test]
    fn no_cheaper_type_abandons() {
        let harness = Harness::new();
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 2);
        let results = SchedulingResults {
            new_node_claims: vec![replacement(vec![od_type("x.equal", 1.0)], &[CapacityType::OnDemand])],
            pod_errors: Default::default(),
        };
        let consolidation = consolidation(&harness, ScriptedSimulator::new().with(["a"], Ok(results)));

        assert!(consolidation.compute_consolidation(&[a]).unwrap().is_empty());
        assert_eq!(
            harness.recorder.messages(),
            vec!["Can't replace with a cheaper node".to_string()]
        );
    }

    #[test]
    fn mixed_capacity_replacement_is_pinned_to_spot() {
        let harness = Harness::new();
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 2);
        let results = SchedulingResults {
            new_node_claims: vec![replacement(
                vec![mixed_type("x.mixed", 0.8, 0.3)],
                &[CapacityType::OnDemand, CapacityType::Spot],
            )],
            pod_errors: Default::default(),
        };
        let consolidation = consolidation(&harness, ScriptedSimulator::new().with(["a"], Ok(results)));

        let cmd = consolidation.compute_consolidation(&[a]).unwrap();

        let reqs = &cmd.replacements[0].requirements;
        assert!(reqs.allows_capacity_type(CapacityType::Spot));
        assert!(!reqs.allows_capacity_type(CapacityType::OnDemand));
    }

    #[test]
    fn missing_offering_is_a_hard_error() {
        let harness = Harness::new();
        // m.large has no spot offering in zone-b.
        let a = harness.node_in_zone("a", "m.large", CapacityType::OnDemand, "zone-b", 1);
        let results = SchedulingResults {
            new_node_claims: vec![replacement(vec![od_type("x.cheap", 0.1)], &[CapacityType::OnDemand])],
            pod_errors: Default::default(),
        };
        let consolidation = consolidation(&harness, ScriptedSimulator::new().with(["a"], Ok(results)));

        let err = consolidation.compute_consolidation(&[a]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to determine offering for m.large/on-demand/zone-b"
        );
    }

    #[test]
    fn compute_is_idempotent_on_unchanged_snapshot() {
        let harness = Harness::new();
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 2);
        let results = SchedulingResults {
            new_node_claims: vec![replacement(
                vec![od_type("x.cheap", 0.5), mixed_type("x.mixed", 0.9, 0.2)],
                &[CapacityType::OnDemand, CapacityType::Spot],
            )],
            pod_errors: Default::default(),
        };
        let consolidation = consolidation(&harness, ScriptedSimulator::new().with(["a"], Ok(results)));

        let first = consolidation.compute_consolidation(&[a.clone()]).unwrap();
        let second = consolidation.compute_consolidation(&[a]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn candidates_sorted_by_cost_after_filtering() {
        let harness = Harness::new();
        let busy = harness.node("busy", "m.large", CapacityType::OnDemand, 5);
        let idle = harness.node("idle", "m.large", CapacityType::OnDemand, 0);
        let light = harness.node("light", "m.large", CapacityType::OnDemand, 1);
        let blocked = harness.node_with_pods(
            "blocked",
            vec![Pod::new("default", "db").with_annotation(DO_NOT_DISRUPT_ANNOTATION, "true")],
        );

        let mut collaborators = harness.collaborators(ScriptedSimulator::new());
        collaborators.filter = Arc::new(DoNotDisruptFilter::new(harness.recorder.clone()));
        let consolidation = Consolidation::new(collaborators, &DisruptionConfig::default());

        let sorted = consolidation
            .sort_and_filter_candidates(&[busy, blocked, idle, light])
            .unwrap();
        let names: Vec<&str> = sorted.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["idle", "light", "busy"]);
        assert_eq!(harness.recorder.events().len(), 1);
    }

    #[test]
    fn fingerprint_tracks_cluster_changes() {
        let harness = Harness::new();
        let mut consolidation = consolidation(&harness, ScriptedSimulator::new());
        assert!(!consolidation.is_consolidated());

        consolidation.mark_consolidated();
        assert!(consolidation.is_consolidated());

        harness.node("late", "m.large", CapacityType::OnDemand, 0);
        assert!(!consolidation.is_consolidated());
    }
}
