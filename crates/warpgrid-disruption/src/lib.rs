//! warpgrid-disruption: node disruption planning for cluster autoscaling.
//!
//! Decides which nodes to remove or replace to reduce cost: nodes that
//! have been empty long enough are deleted, and underutilized nodes are
//! consolidated when their pods fit elsewhere or on one cheaper node.
//!
//! # Architecture
//!
//! ```text
//! DisruptionController (one pass per poll interval)
//!   ├── ClusterState  -> fresh Candidates, pool usage, fingerprint
//!   ├── DisruptionBudgets (rebuilt per method)
//!   ├── Methods, in priority order
//!   │     ├── Emptiness
//!   │     ├── MultiNodeConsolidation ─┐
//!   │     └── SingleNodeConsolidation ┴─ Consolidation::compute_consolidation
//!   │                                      ├── Simulator (what-if scheduling)
//!   │                                      └── spot-to-spot branch
//!   └── CommandQueue
//!         └── ValidatingQueue: wait TTL -> Validation -> execute callback
//! ```
//!
//! Planning is synchronous and touches nothing but the budget mapping it
//! is handed, plus fire-and-forget events and metrics. Everything that
//! waits lives in the queue.

pub mod budget;
pub mod candidate;
pub mod clock;
pub mod cluster;
pub mod command;
pub mod config;
pub mod consolidation;
pub mod controller;
pub mod cost;
pub mod eligibility;
pub mod emptiness;
pub mod error;
pub mod events;
pub mod filter;
pub mod instance_type;
pub mod method;
pub mod metrics;
pub mod multi_node;
pub mod queue;
pub mod requirements;
pub mod simulator;
pub mod single_node;
pub mod spot_to_spot;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_util;

pub use budget::DisruptionBudgets;
pub use candidate::Candidate;
pub use clock::{Clock, FakeClock, SystemClock};
pub use cluster::{ClusterState, ConsolidationState, InMemoryCluster, PoolUsage};
pub use command::{Command, Decision};
pub use config::DisruptionConfig;
pub use consolidation::Consolidation;
pub use controller::{DisruptionController, Plan};
pub use emptiness::Emptiness;
pub use error::{DisruptionError, DisruptionResult, SimulationError};
pub use events::{Event, EventKind, MemoryRecorder, Recorder, TracingRecorder};
pub use filter::{AllowAll, CandidateFilter, DoNotDisruptFilter};
pub use instance_type::{CapacityType, InstanceType, InstanceTypeOptions, Offering, Offerings};
pub use method::{Collaborators, Method, Reason};
pub use metrics::DisruptionMetrics;
pub use multi_node::MultiNodeConsolidation;
pub use queue::{CommandQueue, ExecuteCallback, QueuedCommand, ValidatingQueue};
pub use requirements::{Requirement, Requirements};
pub use simulator::{NodeClaimTemplate, SchedulingResults, ScriptedSimulator, Simulator};
pub use single_node::SingleNodeConsolidation;
pub use types::{
    Budget, Condition, ConditionType, ConsolidateAfter, ConsolidationPolicy, Disruption, NodePool,
    Pod, StateNode,
};
pub use validation::{Validation, ValidationError};
