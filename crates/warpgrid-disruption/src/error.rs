//! Disruption planning error types.

use thiserror::Error;

use crate::instance_type::CapacityType;

/// Result type alias for disruption planning operations.
pub type DisruptionResult<T> = Result<T, DisruptionError>;

/// Errors that abort a planning attempt.
///
/// Abandoning a candidate (unschedulable pods, no cheaper replacement,
/// disabled policy) is not an error; those paths return an empty
/// `Command` instead.
#[derive(Debug, Error)]
pub enum DisruptionError {
    #[error("unable to determine offering for {instance_type}/{capacity_type}/{zone}")]
    MissingOffering {
        instance_type: String,
        capacity_type: CapacityType,
        zone: String,
    },

    #[error("simulating scheduling: {0}")]
    Simulation(#[from] SimulationError),

    #[error("filtering candidates: {0}")]
    Filter(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("orchestration queue closed")]
    QueueClosed,
}

/// Errors reported by a what-if scheduling simulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// A candidate started terminating while the simulation ran. The
    /// planner treats this as "nothing to do" and retries next pass.
    #[error("candidate {0} is being deleted")]
    CandidateDeleting(String),

    #[error("{0}")]
    Failed(String),
}
