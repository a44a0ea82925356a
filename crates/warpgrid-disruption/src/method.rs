//! The interface shared by all disruption methods.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::budget::DisruptionBudgets;
use crate::candidate::Candidate;
use crate::cluster::ClusterState;
use crate::clock::Clock;
use crate::command::Command;
use crate::error::DisruptionResult;
use crate::events::Recorder;
use crate::filter::CandidateFilter;
use crate::metrics::DisruptionMetrics;
use crate::simulator::Simulator;

/// Why a command disrupts its candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Empty,
    Underutilized,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Empty => "empty",
            Reason::Underutilized => "underutilized",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A way of choosing nodes to disrupt.
///
/// The driver narrows the candidate snapshot with `should_disrupt`, then
/// asks for a command with a budget mapping shared by the whole pass.
pub trait Method: Send {
    fn should_disrupt(&self, candidate: &Candidate) -> bool;

    fn compute_command(
        &mut self,
        budgets: &mut DisruptionBudgets,
        candidates: &[Arc<Candidate>],
    ) -> DisruptionResult<Command>;

    fn reason(&self) -> Reason;

    /// "single", "multi", or empty for non-consolidation methods.
    fn consolidation_type(&self) -> &'static str;
}

/// External collaborators the planners read from and report to.
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub cluster: Arc<dyn ClusterState>,
    pub simulator: Arc<dyn Simulator>,
    pub filter: Arc<dyn CandidateFilter>,
    pub recorder: Arc<dyn Recorder>,
    pub metrics: Arc<DisruptionMetrics>,
}
