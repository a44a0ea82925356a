//! What-if scheduling simulation.
//!
//! The planners ask a `Simulator` whether the pods on a set of candidates
//! still fit if those candidates are removed, and which new nodes would be
//! needed. Bin-packing itself lives behind this trait.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::error::SimulationError;
use crate::instance_type::InstanceTypeOptions;
use crate::requirements::Requirements;

/// A node the simulation would need to launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeClaimTemplate {
    pub node_pool: String,
    /// Acceptable instance types.
    pub instance_type_options: InstanceTypeOptions,
    pub requirements: Requirements,
}

/// Outcome of one simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulingResults {
    #[serde(default)]
    pub new_node_claims: Vec<NodeClaimTemplate>,
    /// Pods that were already running somewhere and could not be placed,
    /// keyed by `namespace/name`. Pending pods are not reported here.
    #[serde(default)]
    pub pod_errors: BTreeMap<String, String>,
}

impl SchedulingResults {
    pub fn all_non_pending_pods_scheduled(&self) -> bool {
        self.pod_errors.is_empty()
    }

    /// Human-readable summary of why pods could not be placed.
    pub fn non_pending_pod_scheduling_errors(&self) -> String {
        let mut parts: Vec<String> = self
            .pod_errors
            .iter()
            .map(|(pod, err)| format!("pod {pod} can't be scheduled: {err}"))
            .collect();
        if parts.is_empty() {
            return String::new();
        }
        // Keep the message readable for large nodes.
        const MAX_REPORTED: usize = 3;
        let extra = parts.len().saturating_sub(MAX_REPORTED);
        parts.truncate(MAX_REPORTED);
        let mut msg = parts.join("; ");
        if extra > 0 {
            msg.push_str(&format!(" (and {extra} other pods)"));
        }
        msg
    }
}

pub trait Simulator: Send + Sync {
    /// Simulate removing `candidates` and rescheduling their pods.
    fn simulate(&self, candidates: &[Arc<Candidate>]) -> Result<SchedulingResults, SimulationError>;
}

/// Replays recorded outcomes keyed by the set of candidate node names.
///
/// A candidate set with no recorded outcome is reported as unschedulable,
/// so the planners abandon it rather than guess.
#[derive(Debug, Default)]
pub struct ScriptedSimulator {
    outcomes: HashMap<Vec<String>, Result<SchedulingResults, SimulationError>>,
    calls: AtomicUsize,
}

impl ScriptedSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<I, S>(&mut self, node_names: I, outcome: Result<SchedulingResults, SimulationError>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outcomes.insert(Self::key(node_names), outcome);
    }

    /// Builder-style `record`.
    pub fn with<I, S>(mut self, node_names: I, outcome: Result<SchedulingResults, SimulationError>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.record(node_names, outcome);
        self
    }

    /// Number of simulations run so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn key<I, S>(node_names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut key: Vec<String> = node_names.into_iter().map(Into::into).collect();
        key.sort();
        key
    }
}

impl Simulator for ScriptedSimulator {
    fn simulate(&self, candidates: &[Arc<Candidate>]) -> Result<SchedulingResults, SimulationError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let key = Self::key(candidates.iter().map(|c| c.name().to_string()));
        match self.outcomes.get(&key) {
            Some(outcome) => outcome.clone(),
            None => Ok(SchedulingResults {
                new_node_claims: Vec::new(),
                pod_errors: BTreeMap::from([(
                    "*".to_string(),
                    format!("no recorded simulation for [{}]", key.join(", ")),
                )]),
            }),
        }
    }
}
