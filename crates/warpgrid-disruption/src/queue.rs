//! Orchestration queue: holds commands for the consolidation TTL,
//! re-validates them, and hands valid ones to an executor.
//!
//! The planner submits a command and moves on. A single background worker
//! drains the queue in submission order; each command waits until `ttl`
//! has passed since it was submitted, then is validated against fresh
//! cluster state. Commands that no longer hold are dropped.
//!
//! Candidates of a queued command stay in flight until the command is
//! dropped or executed, so later passes do not plan them again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::{DisruptionError, DisruptionResult};
use crate::method::Reason;
use crate::metrics::DisruptionMetrics;
use crate::validation::Validation;

/// A command waiting for validation.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub command: Command,
    pub reason: Reason,
    pub consolidation_type: &'static str,
    pub submitted_at: Instant,
}

/// Callback that carries out a validated command.
pub type ExecuteCallback = Box<dyn Fn(QueuedCommand) -> BoxFuture + Send + Sync>;

pub type BoxFuture = std::pin::Pin<
    Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
>;

/// Where the reconciliation driver sends the commands it plans.
pub trait CommandQueue: Send + Sync {
    fn submit(
        &self,
        command: Command,
        reason: Reason,
        consolidation_type: &'static str,
    ) -> DisruptionResult<()>;

    /// True while `node_name` belongs to a submitted command that has not
    /// been dropped or executed yet.
    fn in_flight(&self, node_name: &str) -> bool;
}

type InFlight = Arc<Mutex<HashSet<String>>>;

fn release(in_flight: &InFlight, command: &Command) {
    if let Ok(mut names) = in_flight.lock() {
        for name in command.candidate_names() {
            names.remove(name);
        }
    }
}

/// Queue backed by a background tokio task.
#[derive(Clone)]
pub struct ValidatingQueue {
    tx: mpsc::UnboundedSender<QueuedCommand>,
    in_flight: InFlight,
}

impl ValidatingQueue {
    /// Start the worker. It stops when `shutdown` changes or every
    /// `ValidatingQueue` handle has been dropped.
    pub fn spawn(
        ttl: Duration,
        validation: Validation,
        metrics: Arc<DisruptionMetrics>,
        execute: ExecuteCallback,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let in_flight = InFlight::default();
        let worker_in_flight = Arc::clone(&in_flight);
        let handle = tokio::spawn(async move {
            run_worker(ttl, validation, metrics, execute, rx, worker_in_flight, shutdown).await;
        });
        (Self { tx, in_flight }, handle)
    }
}

impl CommandQueue for ValidatingQueue {
    fn submit(
        &self,
        command: Command,
        reason: Reason,
        consolidation_type: &'static str,
    ) -> DisruptionResult<()> {
        if let Ok(mut names) = self.in_flight.lock() {
            names.extend(command.candidate_names().into_iter().map(str::to_string));
        }
        self.tx
            .send(QueuedCommand {
                command,
                reason,
                consolidation_type,
                submitted_at: Instant::now(),
            })
            .map_err(|e| {
                release(&self.in_flight, &e.0.command);
                DisruptionError::QueueClosed
            })
    }

    fn in_flight(&self, node_name: &str) -> bool {
        self.in_flight
            .lock()
            .map(|names| names.contains(node_name))
            .unwrap_or(false)
    }
}

async fn run_worker(
    ttl: Duration,
    validation: Validation,
    metrics: Arc<DisruptionMetrics>,
    execute: ExecuteCallback,
    mut rx: mpsc::UnboundedReceiver<QueuedCommand>,
    in_flight: InFlight,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(ttl_secs = ttl.as_secs(), "validating queue started");

    loop {
        let queued = tokio::select! {
            item = rx.recv() => match item {
                Some(queued) => queued,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        tokio::select! {
            _ = tokio::time::sleep_until(queued.submitted_at + ttl) => {}
            _ = shutdown.changed() => break,
        }

        if let Err(e) = validation.validate(&queued.command, queued.reason) {
            info!(
                command = %queued.command,
                reason = %queued.reason,
                error = %e,
                "command is no longer valid, dropping"
            );
            release(&in_flight, &queued.command);
            continue;
        }

        metrics.record_decision(
            queued.command.decision(),
            queued.reason.as_str(),
            queued.consolidation_type,
        );
        debug!(command = %queued.command, reason = %queued.reason, "executing command");

        let command = queued.command.clone();
        if let Err(e) = execute(queued).await {
            warn!(command = %command, error = %e, "executing command failed");
        }
        release(&in_flight, &command);
    }

    info!("validating queue shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimulationError;
    use crate::instance_type::CapacityType;
    use crate::simulator::{SchedulingResults, ScriptedSimulator};
    use crate::test_util::*;

    fn recording_executor() -> (ExecuteCallback, mpsc::UnboundedReceiver<Vec<String>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let execute: ExecuteCallback = Box::new(move |queued: QueuedCommand| -> BoxFuture {
            let tx = tx.clone();
            Box::pin(async move {
                let names = queued
                    .command
                    .candidate_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                tx.send(names)?;
                Ok(())
            })
        });
        (execute, rx)
    }

    fn delete() -> Result<SchedulingResults, SimulationError> {
        Ok(SchedulingResults::default())
    }

    #[tokio::test(start_paused = true)]
    async fn executes_after_ttl() {
        let harness = Harness::new();
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 1);
        let validation = Validation::new(harness.collaborators(ScriptedSimulator::new().with(["a"], delete())));
        let (execute, mut executed) = recording_executor();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let (queue, _handle) = ValidatingQueue::spawn(
            Duration::from_secs(15),
            validation,
            Arc::clone(&harness.metrics),
            execute,
            shutdown_rx,
        );

        let start = Instant::now();
        queue
            .submit(Command::delete(vec![a]), Reason::Underutilized, "single")
            .unwrap();

        assert_eq!(executed.recv().await.unwrap(), vec!["a".to_string()]);
        assert!(start.elapsed() >= Duration::from_secs(15));
        assert!(harness
            .metrics
            .render_prometheus()
            .contains("decision=\"delete\",method=\"underutilized\",consolidation_type=\"single\""));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_commands_are_dropped() {
        let harness = Harness::new();
        let gone = harness.node("gone", "m.large", CapacityType::OnDemand, 1);
        let kept = harness.node("kept", "m.large", CapacityType::OnDemand, 1);
        let sim = ScriptedSimulator::new()
            .with(["gone"], delete())
            .with(["kept"], delete());
        let validation = Validation::new(harness.collaborators(sim));
        let (execute, mut executed) = recording_executor();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, _handle) = ValidatingQueue::spawn(
            Duration::from_secs(15),
            validation,
            Arc::clone(&harness.metrics),
            execute,
            shutdown_rx,
        );

        queue
            .submit(Command::delete(vec![gone]), Reason::Underutilized, "single")
            .unwrap();
        queue
            .submit(Command::delete(vec![kept]), Reason::Underutilized, "single")
            .unwrap();
        harness.cluster.remove_node("gone");

        assert_eq!(executed.recv().await.unwrap(), vec!["kept".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn candidates_stay_in_flight_until_executed() {
        let harness = Harness::new();
        let a = harness.node("a", "m.large", CapacityType::OnDemand, 1);
        let validation = Validation::new(harness.collaborators(ScriptedSimulator::new().with(["a"], delete())));
        let (execute, mut executed) = recording_executor();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, _handle) = ValidatingQueue::spawn(
            Duration::from_secs(15),
            validation,
            Arc::clone(&harness.metrics),
            execute,
            shutdown_rx,
        );

        assert!(!queue.in_flight("a"));
        queue
            .submit(Command::delete(vec![a]), Reason::Underutilized, "single")
            .unwrap();
        assert!(queue.in_flight("a"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(queue.in_flight("a"));

        executed.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!queue.in_flight("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_commands_leave_flight() {
        let harness = Harness::new();
        let gone = harness.node("gone", "m.large", CapacityType::OnDemand, 1);
        let validation = Validation::new(harness.collaborators(ScriptedSimulator::new().with(["gone"], delete())));
        let (execute, _executed) = recording_executor();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, _handle) = ValidatingQueue::spawn(
            Duration::from_secs(15),
            validation,
            Arc::clone(&harness.metrics),
            execute,
            shutdown_rx,
        );

        queue
            .submit(Command::delete(vec![gone]), Reason::Underutilized, "single")
            .unwrap();
        harness.cluster.remove_node("gone");

        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(!queue.in_flight("gone"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_worker_and_closes_queue() {
        let harness = Harness::new();
        let validation = Validation::new(harness.collaborators(ScriptedSimulator::new()));
        let (execute, _executed) = recording_executor();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, handle) = ValidatingQueue::spawn(
            Duration::from_secs(15),
            validation,
            Arc::clone(&harness.metrics),
            execute,
            shutdown_rx,
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let a = harness.node("a", "m.large", CapacityType::OnDemand, 0);
        let err = queue
            .submit(Command::delete(vec![a]), Reason::Empty, "")
            .unwrap_err();
        assert!(matches!(err, DisruptionError::QueueClosed));
        assert!(!queue.in_flight("a"));
    }
}
