//! Disruption cost: how expensive it is to evict a node's workloads.
//!
//! Lower cost means a better removal candidate. Each pod costs 1.0 by
//! default, shifted by its deletion-cost annotation and its scheduling
//! priority, and clamped to [-10, 10].

use tracing::debug;

use crate::types::{POD_DELETION_COST_ANNOTATION, Pod};

const MIN_POD_COST: f64 = -10.0;
const MAX_POD_COST: f64 = 10.0;

/// Cost of evicting a single pod.
pub fn eviction_cost(pod: &Pod) -> f64 {
    let mut cost = 1.0;

    if let Some(raw) = pod.annotations.get(POD_DELETION_COST_ANNOTATION) {
        match raw.parse::<f64>() {
            // Deletion cost spans the i32 range; 2^27 maps the extremes to
            // roughly -15 and +17 pods.
            Ok(deletion_cost) => cost += deletion_cost / 2f64.powi(27),
            Err(_) => debug!(pod = %pod.key(), value = %raw, "ignoring malformed pod deletion cost"),
        }
    }

    // Max priority (1e9) is worth about eight pods.
    cost += f64::from(pod.priority) / 2f64.powi(25);

    cost.clamp(MIN_POD_COST, MAX_POD_COST)
}

/// Total cost of rescheduling every pod on a node.
pub fn disruption_cost(pods: &[Pod]) -> f64 {
    pods.iter().map(eviction_cost).sum()
}
