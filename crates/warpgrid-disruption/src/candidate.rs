//! Candidate: one node under consideration for removal or replacement.
//!
//! A candidate is a point-in-time snapshot assembled from the cluster
//! state store at the start of a planning pass. Fields are private and
//! there are no setters: planners share candidates as `Arc<Candidate>`
//! and a new pass always builds fresh ones.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::cost::disruption_cost;
use crate::instance_type::{CapacityType, InstanceType};
use crate::types::{Condition, ConditionType, NodePool, Pod, StateNode};

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    node_name: String,
    node_claim: String,
    node_pool: Arc<NodePool>,
    instance_type: InstanceType,
    capacity_type: CapacityType,
    zone: String,
    pods: Vec<Pod>,
    annotations: HashMap<String, String>,
    conditions: Vec<Condition>,
    marked_for_deletion: bool,
    disruption_cost: f64,
}

impl Candidate {
    /// Snapshot `node`, resolved against its pool and instance type.
    pub fn new(node: &StateNode, node_pool: Arc<NodePool>, instance_type: InstanceType) -> Self {
        Self {
            node_name: node.node_name.clone(),
            node_claim: node.node_claim.clone(),
            node_pool,
            instance_type,
            capacity_type: node.capacity_type,
            zone: node.zone.clone(),
            disruption_cost: disruption_cost(&node.pods),
            pods: node.pods.clone(),
            annotations: node.annotations.clone(),
            conditions: node.conditions.clone(),
            marked_for_deletion: node.marked_for_deletion,
        }
    }

    pub fn name(&self) -> &str {
        &self.node_name
    }

    pub fn node_claim(&self) -> &str {
        &self.node_claim
    }

    pub fn node_pool(&self) -> &NodePool {
        &self.node_pool
    }

    pub fn instance_type(&self) -> &InstanceType {
        &self.instance_type
    }

    pub fn capacity_type(&self) -> CapacityType {
        self.capacity_type
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn pods(&self) -> &[Pod] {
        &self.pods
    }

    pub fn annotations(&self) -> &HashMap<String, String> {
        &self.annotations
    }

    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Deletion of the underlying node has already been requested.
    pub fn is_deleting(&self) -> bool {
        self.marked_for_deletion
    }

    /// Ranking value; lower is a better candidate for removal.
    pub fn disruption_cost(&self) -> f64 {
        self.disruption_cost
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.node_name, self.instance_type.name, self.capacity_type, self.zone
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance_type::Offerings;
    use crate::types::Disruption;

    fn state_node(pods: Vec<Pod>) -> StateNode {
        StateNode {
            node_name: "node-1".to_string(),
            node_claim: "claim-1".to_string(),
            node_pool: "default".to_string(),
            instance_type: "m.large".to_string(),
            capacity_type: CapacityType::Spot,
            zone: "zone-a".to_string(),
            pods,
            annotations: HashMap::new(),
            conditions: Vec::new(),
            marked_for_deletion: false,
        }
    }

    fn pool() -> Arc<NodePool> {
        Arc::new(NodePool {
            name: "default".to_string(),
            disruption: Disruption::default(),
        })
    }

    fn instance_type() -> InstanceType {
        InstanceType {
            name: "m.large".to_string(),
            offerings: Offerings::default(),
        }
    }

    #[test]
    fn snapshot_copies_node_fields() {
        let node = state_node(vec![Pod::new("default", "a"), Pod::new("default", "b")]);
        let candidate = Candidate::new(&node, pool(), instance_type());

        assert_eq!(candidate.name(), "node-1");
        assert_eq!(candidate.node_claim(), "claim-1");
        assert_eq!(candidate.node_pool().name, "default");
        assert_eq!(candidate.capacity_type(), CapacityType::Spot);
        assert_eq!(candidate.pods().len(), 2);
        assert_eq!(candidate.disruption_cost(), 2.0);
        assert_eq!(candidate.to_string(), "node-1/m.large/spot/zone-a");
    }

    #[test]
    fn snapshot_is_detached_from_source() {
        let mut node = state_node(Vec::new());
        let candidate = Candidate::new(&node, pool(), instance_type());

        node.pods.push(Pod::new("default", "late"));
        node.marked_for_deletion = true;

        assert!(candidate.pods().is_empty());
        assert!(!candidate.is_deleting());
    }
}
