//! Disruption metrics and their Prometheus text exposition.
//!
//! Updates take a short write lock and are skipped if the lock is
//! poisoned; metrics never influence a planning decision.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::command::Decision;

/// Label set (method, consolidation type).
type MethodLabels = (String, String);

#[derive(Debug, Default)]
pub struct DisruptionMetrics {
    eligible_nodes: RwLock<BTreeMap<MethodLabels, f64>>,
    decisions: RwLock<BTreeMap<(Decision, String, String), u64>>,
    abandoned: RwLock<BTreeMap<String, u64>>,
}

impl DisruptionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of candidates a method evaluated this pass.
    pub fn set_eligible_nodes(&self, method: &str, consolidation_type: &str, count: usize) {
        if let Ok(mut gauges) = self.eligible_nodes.write() {
            gauges.insert(
                (method.to_string(), consolidation_type.to_string()),
                count as f64,
            );
        }
    }

    pub fn record_decision(&self, decision: Decision, method: &str, consolidation_type: &str) {
        if let Ok(mut counters) = self.decisions.write() {
            *counters
                .entry((decision, method.to_string(), consolidation_type.to_string()))
                .or_insert(0) += 1;
        }
    }

    /// Count a candidate set that was considered and given up on.
    pub fn record_abandoned(&self, method: &str) {
        if let Ok(mut counters) = self.abandoned.write() {
            *counters.entry(method.to_string()).or_insert(0) += 1;
        }
    }

    pub fn eligible_nodes(&self, method: &str, consolidation_type: &str) -> Option<f64> {
        self.eligible_nodes.read().ok().and_then(|gauges| {
            gauges
                .get(&(method.to_string(), consolidation_type.to_string()))
                .copied()
        })
    }

    pub fn abandoned(&self, method: &str) -> u64 {
        self.abandoned
            .read()
            .ok()
            .and_then(|c| c.get(method).copied())
            .unwrap_or(0)
    }

    /// Render all metrics in Prometheus text format.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP warpgrid_disruption_eligible_nodes Candidates evaluated by a disruption method.\n");
        out.push_str("# TYPE warpgrid_disruption_eligible_nodes gauge\n");
        if let Ok(gauges) = self.eligible_nodes.read() {
            for ((method, consolidation_type), value) in gauges.iter() {
                out.push_str(&format!(
                    "warpgrid_disruption_eligible_nodes{{method=\"{}\",consolidation_type=\"{}\"}} {}\n",
                    method, consolidation_type, value
                ));
            }
        }

        out.push_str("# HELP warpgrid_disruption_decisions_total Commands produced by disruption methods.\n");
        out.push_str("# TYPE warpgrid_disruption_decisions_total counter\n");
        if let Ok(counters) = self.decisions.read() {
            for ((decision, method, consolidation_type), value) in counters.iter() {
                out.push_str(&format!(
                    "warpgrid_disruption_decisions_total{{decision=\"{}\",method=\"{}\",consolidation_type=\"{}\"}} {}\n",
                    decision, method, consolidation_type, value
                ));
            }
        }

        out.push_str("# HELP warpgrid_disruption_abandoned_total Candidate sets abandoned without a command.\n");
        out.push_str("# TYPE warpgrid_disruption_abandoned_total counter\n");
        if let Ok(counters) = self.abandoned.read() {
            for (method, value) in counters.iter() {
                out.push_str(&format!(
                    "warpgrid_disruption_abandoned_total{{method=\"{}\"}} {}\n",
                    method, value
                ));
            }
        }

        out
    }
}
