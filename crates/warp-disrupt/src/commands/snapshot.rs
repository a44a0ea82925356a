//! Cluster snapshots for offline planning.
//!
//! A snapshot is a JSON document holding everything one disruption pass
//! reads: pools, instance types, nodes, and the scheduling outcomes a
//! simulator reported for specific candidate sets.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use warpgrid_disruption::{
    FakeClock, InMemoryCluster, InstanceType, NodeClaimTemplate, NodePool, SchedulingResults,
    ScriptedSimulator, SimulationError, StateNode,
};

#[derive(Debug, Deserialize)]
pub struct Snapshot {
    /// Unix timestamp the pass runs at. Defaults to the latest condition
    /// transition in the snapshot.
    #[serde(default)]
    pub now: Option<u64>,
    #[serde(default)]
    pub node_pools: Vec<NodePool>,
    #[serde(default)]
    pub instance_types: Vec<InstanceType>,
    #[serde(default)]
    pub nodes: Vec<StateNode>,
    #[serde(default)]
    pub simulations: Vec<RecordedSimulation>,
}

/// Outcome of simulating the removal of `candidates`.
#[derive(Debug, Deserialize)]
pub struct RecordedSimulation {
    pub candidates: Vec<String>,
    #[serde(default)]
    pub new_node_claims: Vec<NodeClaimTemplate>,
    #[serde(default)]
    pub pod_errors: std::collections::BTreeMap<String, String>,
    /// Set when the simulation itself failed.
    #[serde(default)]
    pub error: Option<String>,
}

impl Snapshot {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        Self::from_json_str(&content).with_context(|| format!("parsing snapshot {}", path.display()))
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn now(&self) -> u64 {
        self.now.unwrap_or_else(|| {
            self.nodes
                .iter()
                .flat_map(|n| n.conditions.iter())
                .map(|c| c.last_transition_time)
                .max()
                .unwrap_or(0)
        })
    }

    pub fn clock(&self) -> FakeClock {
        FakeClock::at_epoch_secs(self.now())
    }

    pub fn cluster(&self) -> InMemoryCluster {
        let cluster = InMemoryCluster::new();
        for pool in &self.node_pools {
            cluster.put_node_pool(pool.clone());
        }
        for instance_type in &self.instance_types {
            cluster.put_instance_type(instance_type.clone());
        }
        for node in &self.nodes {
            cluster.put_node(node.clone());
        }
        debug!(
            node_pools = self.node_pools.len(),
            instance_types = self.instance_types.len(),
            nodes = self.nodes.len(),
            "loaded snapshot"
        );
        cluster
    }

    pub fn simulator(&self) -> ScriptedSimulator {
        let mut simulator = ScriptedSimulator::new();
        for sim in &self.simulations {
            let outcome = match &sim.error {
                Some(err) => Err(SimulationError::Failed(err.clone())),
                None => Ok(SchedulingResults {
                    new_node_claims: sim.new_node_claims.clone(),
                    pod_errors: sim.pod_errors.clone(),
                }),
            };
            simulator.record(sim.candidates.iter().cloned(), outcome);
        }
        simulator
    }

    pub fn into_parts(self) -> (Arc<FakeClock>, Arc<InMemoryCluster>, Arc<ScriptedSimulator>) {
        (
            Arc::new(self.clock()),
            Arc::new(self.cluster()),
            Arc::new(self.simulator()),
        )
    }
}
