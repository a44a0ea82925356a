//! Fixtures shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::candidate::Candidate;
use crate::clock::FakeClock;
use crate::cluster::{ClusterState, InMemoryCluster};
use crate::error::SimulationError;
use crate::events::MemoryRecorder;
use crate::filter::AllowAll;
use crate::instance_type::{CapacityType, InstanceType, InstanceTypeOptions, Offering, Offerings};
use crate::method::Collaborators;
use crate::metrics::DisruptionMetrics;
use crate::requirements::{Requirement, Requirements};
use crate::simulator::{NodeClaimTemplate, SchedulingResults, ScriptedSimulator, Simulator};
use crate::types::{ConsolidationPolicy, Disruption, NodePool, Pod, StateNode};

pub const ZONE: &str = "zone-a";

pub fn offering(capacity_type: CapacityType, price: f64) -> Offering {
    Offering {
        capacity_type,
        zone: ZONE.to_string(),
        price,
        available: true,
    }
}

pub fn od_type(name: &str, price: f64) -> InstanceType {
    InstanceType {
        name: name.to_string(),
        offerings: Offerings::new(vec![offering(CapacityType::OnDemand, price)]),
    }
}

pub fn spot_type(name: &str, price: f64) -> InstanceType {
    InstanceType {
        name: name.to_string(),
        offerings: Offerings::new(vec![offering(CapacityType::Spot, price)]),
    }
}

pub fn mixed_type(name: &str, on_demand: f64, spot: f64) -> InstanceType {
    InstanceType {
        name: name.to_string(),
        offerings: Offerings::new(vec![
            offering(CapacityType::OnDemand, on_demand),
            offering(CapacityType::Spot, spot),
        ]),
    }
}

/// `count` spot types named `s00`, `s01`, ... priced from `start` in
/// steps of 0.01.
pub fn spot_types(count: usize, start: f64) -> Vec<InstanceType> {
    (0..count)
        .map(|i| spot_type(&format!("s{i:02}"), start + i as f64 * 0.01))
        .collect()
}

pub fn replacement(options: Vec<InstanceType>, capacity_types: &[CapacityType]) -> NodeClaimTemplate {
    NodeClaimTemplate {
        node_pool: "default".to_string(),
        instance_type_options: InstanceTypeOptions::new(options),
        requirements: Requirements::new().with(Requirement::capacity_types(capacity_types)),
    }
}

pub fn pool(name: &str, policy: ConsolidationPolicy) -> NodePool {
    NodePool {
        name: name.to_string(),
        disruption: Disruption {
            consolidation_policy: Some(policy),
            consolidate_after: None,
            budgets: Vec::new(),
        },
    }
}

pub fn state_node(
    name: &str,
    pool: &str,
    instance_type: &str,
    capacity_type: CapacityType,
    zone: &str,
    pods: Vec<Pod>,
) -> StateNode {
    StateNode {
        node_name: name.to_string(),
        node_claim: format!("{name}-claim"),
        node_pool: pool.to_string(),
        instance_type: instance_type.to_string(),
        capacity_type,
        zone: zone.to_string(),
        pods,
        annotations: HashMap::new(),
        conditions: Vec::new(),
        marked_for_deletion: false,
    }
}

pub fn pods(node: &str, count: usize) -> Vec<Pod> {
    (0..count)
        .map(|i| Pod::new("default", &format!("{node}-{i}")))
        .collect()
}

/// A cluster with a `WhenUnderutilized` pool named "default" and two
/// instance types:
///
/// | type     | on-demand | spot |
/// |----------|-----------|------|
/// | m.large  | 1.0       | 0.4  |
/// | m.xlarge | 2.0       | 0.8  |
pub struct Harness {
    pub clock: Arc<FakeClock>,
    pub cluster: Arc<InMemoryCluster>,
    pub recorder: Arc<MemoryRecorder>,
    pub metrics: Arc<DisruptionMetrics>,
}

impl Harness {
    pub fn new() -> Self {
        let cluster = InMemoryCluster::new();
        cluster.put_node_pool(pool("default", ConsolidationPolicy::WhenUnderutilized));
        cluster.put_instance_type(mixed_type("m.large", 1.0, 0.4));
        cluster.put_instance_type(mixed_type("m.xlarge", 2.0, 0.8));
        Self {
            clock: Arc::new(FakeClock::at_epoch_secs(10_000)),
            cluster: Arc::new(cluster),
            recorder: Arc::new(MemoryRecorder::new()),
            metrics: Arc::new(DisruptionMetrics::new()),
        }
    }

    pub fn collaborators(&self, simulator: ScriptedSimulator) -> Collaborators {
        self.collaborators_shared(Arc::new(simulator))
    }

    pub fn collaborators_shared(&self, simulator: Arc<ScriptedSimulator>) -> Collaborators {
        Collaborators {
            clock: self.clock.clone(),
            cluster: self.cluster.clone(),
            simulator,
            filter: Arc::new(AllowAll),
            recorder: self.recorder.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Add a node to the default pool in the default zone.
    pub fn node(&self, name: &str, instance_type: &str, capacity_type: CapacityType, pod_count: usize) -> Arc<Candidate> {
        self.node_in_zone(name, instance_type, capacity_type, ZONE, pod_count)
    }

    pub fn node_in_zone(
        &self,
        name: &str,
        instance_type: &str,
        capacity_type: CapacityType,
        zone: &str,
        pod_count: usize,
    ) -> Arc<Candidate> {
        self.add_node(state_node(
            name,
            "default",
            instance_type,
            capacity_type,
            zone,
            pods(name, pod_count),
        ))
    }

    pub fn node_with_pods(&self, name: &str, pods: Vec<Pod>) -> Arc<Candidate> {
        self.add_node(state_node(name, "default", "m.large", CapacityType::OnDemand, ZONE, pods))
    }

    /// Store `node` and return the candidate built from it.
    pub fn add_node(&self, node: StateNode) -> Arc<Candidate> {
        let name = node.node_name.clone();
        self.cluster.put_node(node);
        self.cluster
            .candidates()
            .into_iter()
            .find(|c| c.name() == name)
            .expect("node must resolve to a candidate")
    }
}

/// Advances the harness clock by a fixed step on every simulation.
pub struct SlowSimulator {
    clock: Arc<FakeClock>,
    step: Duration,
    inner: ScriptedSimulator,
}

impl SlowSimulator {
    pub fn new(harness: &Harness, step: Duration, inner: ScriptedSimulator) -> Self {
        Self {
            clock: Arc::clone(&harness.clock),
            step,
            inner,
        }
    }
}

impl Simulator for SlowSimulator {
    fn simulate(&self, candidates: &[Arc<Candidate>]) -> Result<SchedulingResults, SimulationError> {
        self.clock.step(self.step);
        self.inner.simulate(candidates)
    }
}
