//! Domain types read by the disruption planners.
//!
//! These mirror the externally owned cluster objects (node pools, nodes,
//! pods). The planners only ever read them; all types serialize to JSON
//! so captured cluster snapshots can be replayed offline.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{format_duration, parse_duration};
use crate::instance_type::CapacityType;

/// Candidate annotation that opts a node out of every disruption method.
pub const DO_NOT_CONSOLIDATE_ANNOTATION: &str = "warpgrid.io/do-not-consolidate";

/// Pod annotation that blocks disruption of the node hosting the pod.
pub const DO_NOT_DISRUPT_ANNOTATION: &str = "warpgrid.io/do-not-disrupt";

/// Pod annotation carrying a user-assigned eviction cost.
pub const POD_DELETION_COST_ANNOTATION: &str = "controller.kubernetes.io/pod-deletion-cost";

// ── Node pool ─────────────────────────────────────────────────────

/// A group of nodes sharing a disruption policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePool {
    pub name: String,
    #[serde(default)]
    pub disruption: Disruption,
}

/// Disruption policy of a node pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Disruption {
    /// Which consolidation method applies. `None` disables both.
    #[serde(default)]
    pub consolidation_policy: Option<ConsolidationPolicy>,
    /// Cooldown before an empty node may be removed. Present-but-`Never`
    /// disables consolidation for the pool.
    #[serde(default)]
    pub consolidate_after: Option<ConsolidateAfter>,
    /// Caps on concurrent disruptions. Empty means the default of 10%.
    #[serde(default)]
    pub budgets: Vec<Budget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsolidationPolicy {
    WhenEmpty,
    WhenUnderutilized,
}

/// `consolidate_after` value: a duration, or the literal `"Never"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConsolidateAfter {
    Never,
    After(Duration),
}

impl ConsolidateAfter {
    pub fn duration(&self) -> Option<Duration> {
        match self {
            ConsolidateAfter::Never => None,
            ConsolidateAfter::After(d) => Some(*d),
        }
    }
}

impl TryFrom<String> for ConsolidateAfter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "Never" {
            return Ok(ConsolidateAfter::Never);
        }
        parse_duration(&value).map(ConsolidateAfter::After)
    }
}

impl From<ConsolidateAfter> for String {
    fn from(value: ConsolidateAfter) -> Self {
        match value {
            ConsolidateAfter::Never => "Never".to_string(),
            ConsolidateAfter::After(d) => format_duration(d),
        }
    }
}

/// One disruption budget: an absolute node count ("5") or a percentage
/// of the pool's nodes ("10%").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub nodes: String,
}

impl Budget {
    pub const DEFAULT_NODES: &'static str = "10%";

    pub fn new(nodes: impl Into<String>) -> Self {
        Self {
            nodes: nodes.into(),
        }
    }

    /// Disruptions this budget allows for a pool of `total` nodes.
    /// Percentages round up.
    pub fn allowed(&self, total: usize) -> Result<usize, String> {
        let raw = self.nodes.trim();
        if let Some(pct) = raw.strip_suffix('%') {
            let pct: usize = pct
                .parse()
                .map_err(|_| format!("invalid budget percentage {raw:?}"))?;
            if pct > 100 {
                return Err(format!("budget percentage {raw:?} exceeds 100%"));
            }
            Ok((total * pct).div_ceil(100))
        } else {
            raw.parse()
                .map_err(|_| format!("invalid budget node count {raw:?}"))
        }
    }
}

// ── Workloads ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub priority: i32,
}

impl Pod {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            annotations: HashMap::new(),
            priority: 0,
        }
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

// ── Nodes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    /// The node has had no workloads bound since `last_transition_time`.
    Empty,
    Initialized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub condition_type: ConditionType,
    pub status: bool,
    /// Unix timestamp (seconds) of the last status change.
    pub last_transition_time: u64,
}

/// Live state of one provisioned node, as held by the cluster state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateNode {
    pub node_name: String,
    pub node_claim: String,
    pub node_pool: String,
    pub instance_type: String,
    pub capacity_type: CapacityType,
    pub zone: String,
    #[serde(default)]
    pub pods: Vec<Pod>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Set once deletion of the node has been requested.
    #[serde(default)]
    pub marked_for_deletion: bool,
}

impl StateNode {
    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Insert or update a condition, keeping the transition time when the
    /// status does not change.
    pub fn set_condition(&mut self, condition_type: ConditionType, status: bool, now: u64) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition_type)
        {
            Some(c) if c.status == status => {}
            Some(c) => {
                c.status = status;
                c.last_transition_time = now;
            }
            None => self.conditions.push(Condition {
                condition_type,
                status,
                last_transition_time: now,
            }),
        }
    }
}

impl fmt::Display for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{}/{})",
            self.node_name, self.instance_type, self.capacity_type, self.zone
        )
    }
}
