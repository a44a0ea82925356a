//! Cluster state: read-only snapshot access for the planners.
//!
//! `ClusterState` is the planner's view of the external state store.
//! `InMemoryCluster` is a complete implementation backed by maps, used by
//! the offline replay tool and the tests. Every mutation bumps a
//! generation counter that serves as the consolidation fingerprint.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::candidate::Candidate;
use crate::instance_type::InstanceType;
use crate::types::{ConditionType, NodePool, Pod, StateNode};

/// Node counts of one pool, used to derive its disruption budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolUsage {
    pub total: usize,
    /// Nodes already marked for deletion.
    pub disrupting: usize,
}

/// Opaque fingerprint of cluster state. Equal values mean nothing a
/// planner cares about has changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ConsolidationState(u64);

impl ConsolidationState {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

pub trait ClusterState: Send + Sync {
    /// Build a fresh candidate for every disruptable node.
    fn candidates(&self) -> Vec<Arc<Candidate>>;

    fn node_pools(&self) -> Vec<Arc<NodePool>>;

    fn pool_usage(&self) -> HashMap<String, PoolUsage>;

    /// Current fingerprint. Must be cheap and side-effect free.
    fn consolidation_state(&self) -> ConsolidationState;
}

#[derive(Default)]
struct Inner {
    pools: BTreeMap<String, Arc<NodePool>>,
    instance_types: HashMap<String, InstanceType>,
    nodes: BTreeMap<String, StateNode>,
}

/// Map-backed cluster state.
#[derive(Default)]
pub struct InMemoryCluster {
    inner: RwLock<Inner>,
    generation: AtomicU64,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_node_pool(&self, pool: NodePool) {
        self.write(|inner| {
            inner.pools.insert(pool.name.clone(), Arc::new(pool));
        });
    }

    pub fn put_instance_type(&self, instance_type: InstanceType) {
        self.write(|inner| {
            inner
                .instance_types
                .insert(instance_type.name.clone(), instance_type);
        });
    }

    pub fn put_node(&self, node: StateNode) {
        self.write(|inner| {
            inner.nodes.insert(node.node_name.clone(), node);
        });
    }

    pub fn remove_node(&self, node_name: &str) -> Option<StateNode> {
        self.write(|inner| inner.nodes.remove(node_name))
    }

    /// Flag a node as being deleted. Returns false if it does not exist.
    pub fn mark_for_deletion(&self, node_name: &str) -> bool {
        self.write(|inner| match inner.nodes.get_mut(node_name) {
            Some(node) => {
                node.marked_for_deletion = true;
                true
            }
            None => false,
        })
    }

    /// Bind a pod to a node, clearing its `Empty` condition.
    pub fn bind_pod(&self, node_name: &str, pod: Pod, now: u64) -> bool {
        self.write(|inner| match inner.nodes.get_mut(node_name) {
            Some(node) => {
                node.pods.push(pod);
                node.set_condition(ConditionType::Empty, false, now);
                true
            }
            None => false,
        })
    }

    /// Remove a pod from a node; the node becomes `Empty` with its last pod.
    pub fn unbind_pod(&self, node_name: &str, pod_key: &str, now: u64) -> bool {
        self.write(|inner| match inner.nodes.get_mut(node_name) {
            Some(node) => {
                let before = node.pods.len();
                node.pods.retain(|p| p.key() != pod_key);
                if node.pods.is_empty() {
                    node.set_condition(ConditionType::Empty, true, now);
                }
                node.pods.len() != before
            }
            None => false,
        })
    }

    pub fn node(&self, node_name: &str) -> Option<StateNode> {
        self.read(|inner| inner.nodes.get(node_name).cloned())
    }

    pub fn instance_type(&self, name: &str) -> Option<InstanceType> {
        self.read(|inner| inner.instance_types.get(name).cloned())
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&inner)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let out = f(&mut inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        out
    }
}

impl ClusterState for InMemoryCluster {
    fn candidates(&self) -> Vec<Arc<Candidate>> {
        self.read(|inner| {
            inner
                .nodes
                .values()
                .filter_map(|node| {
                    let Some(pool) = inner.pools.get(&node.node_pool) else {
                        debug!(node = %node.node_name, pool = %node.node_pool, "node pool not found, skipping candidate");
                        return None;
                    };
                    let Some(instance_type) = inner.instance_types.get(&node.instance_type) else {
                        debug!(node = %node.node_name, instance_type = %node.instance_type, "instance type not found, skipping candidate");
                        return None;
                    };
                    Some(Arc::new(Candidate::new(
                        node,
                        Arc::clone(pool),
                        instance_type.clone(),
                    )))
                })
                .collect()
        })
    }

    fn node_pools(&self) -> Vec<Arc<NodePool>> {
        self.read(|inner| inner.pools.values().cloned().collect())
    }

    fn pool_usage(&self) -> HashMap<String, PoolUsage> {
        self.read(|inner| {
            let mut usage: HashMap<String, PoolUsage> = HashMap::new();
            for node in inner.nodes.values() {
                let entry = usage.entry(node.node_pool.clone()).or_default();
                entry.total += 1;
                if node.marked_for_deletion {
                    entry.disrupting += 1;
                }
            }
            usage
        })
    }

    fn consolidation_state(&self) -> ConsolidationState {
        ConsolidationState(self.generation.load(Ordering::Acquire))
    }
}
