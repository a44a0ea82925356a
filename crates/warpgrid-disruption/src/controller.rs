//! Disruption controller: the reconciliation driver.
//!
//! Each pass asks the disruption methods, in priority order, for a
//! command. Every method gets a fresh candidate snapshot and fresh
//! budgets. Nodes already held by a queued command are skipped. The first non-empty command is submitted to the queue and
//! ends the pass.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::budget::DisruptionBudgets;
use crate::candidate::Candidate;
use crate::command::Command;
use crate::config::DisruptionConfig;
use crate::emptiness::Emptiness;
use crate::error::DisruptionResult;
use crate::method::{Collaborators, Method, Reason};
use crate::multi_node::MultiNodeConsolidation;
use crate::queue::CommandQueue;
use crate::single_node::SingleNodeConsolidation;

/// A command together with the method that produced it.
#[derive(Debug, Clone)]
pub struct Plan {
    pub command: Command,
    pub reason: Reason,
    pub consolidation_type: &'static str,
}

pub struct DisruptionController {
    collaborators: Collaborators,
    methods: Vec<Box<dyn Method>>,
    queue: Arc<dyn CommandQueue>,
}

impl DisruptionController {
    /// Controller with the standard methods: emptiness, then multi-node,
    /// then single-node consolidation.
    pub fn new(
        collaborators: Collaborators,
        config: &DisruptionConfig,
        queue: Arc<dyn CommandQueue>,
    ) -> Self {
        let methods: Vec<Box<dyn Method>> = vec![
            Box::new(Emptiness::new(
                Arc::clone(&collaborators.clock),
                Arc::clone(&collaborators.recorder),
                Arc::clone(&collaborators.metrics),
            )),
            Box::new(MultiNodeConsolidation::new(collaborators.clone(), config)),
            Box::new(SingleNodeConsolidation::new(collaborators.clone(), config)),
        ];
        Self::with_methods(collaborators, methods, queue)
    }

    pub fn with_methods(
        collaborators: Collaborators,
        methods: Vec<Box<dyn Method>>,
        queue: Arc<dyn CommandQueue>,
    ) -> Self {
        Self {
            collaborators,
            methods,
            queue,
        }
    }

    /// Run the methods in order and return the first command, without
    /// submitting it.
    pub fn plan(&mut self) -> DisruptionResult<Option<Plan>> {
        let cluster = &self.collaborators.cluster;

        for method in &mut self.methods {
            let candidates: Vec<Arc<Candidate>> = cluster
                .candidates()
                .into_iter()
                .filter(|c| {
                    !c.is_deleting() && !self.queue.in_flight(c.name()) && method.should_disrupt(c)
                })
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let mut budgets = DisruptionBudgets::build(&cluster.node_pools(), &cluster.pool_usage());
            let command = method.compute_command(&mut budgets, &candidates)?;
            if command.is_empty() {
                debug!(
                    reason = %method.reason(),
                    consolidation_type = method.consolidation_type(),
                    candidates = candidates.len(),
                    "no command"
                );
                continue;
            }

            return Ok(Some(Plan {
                command,
                reason: method.reason(),
                consolidation_type: method.consolidation_type(),
            }));
        }
        Ok(None)
    }

    /// One reconciliation pass. Returns true if a command was submitted.
    pub fn reconcile(&mut self) -> DisruptionResult<bool> {
        let Some(plan) = self.plan()? else {
            return Ok(false);
        };
        info!(
            command = %plan.command,
            reason = %plan.reason,
            consolidation_type = plan.consolidation_type,
            "submitting disruption command"
        );
        self.queue
            .submit(plan.command, plan.reason, plan.consolidation_type)?;
        Ok(true)
    }

    /// Run the reconciliation loop until `shutdown` changes.
    pub async fn run(&mut self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "disruption controller started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.reconcile() {
                        error!(error = %e, "disruption reconciliation failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("disruption controller shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::{DisruptionError, SimulationError};
    use crate::instance_type::CapacityType;
    use crate::simulator::{SchedulingResults, ScriptedSimulator};
    use crate::test_util::*;
    use crate::types::{
        Budget, Condition, ConditionType, ConsolidateAfter, ConsolidationPolicy, Disruption, NodePool,
    };

    #[derive(Default)]
    struct RecordingQueue {
        submitted: Mutex<Vec<(Vec<String>, Reason, &'static str)>>,
    }

    impl CommandQueue for RecordingQueue {
        fn submit(
            &self,
            command: Command,
            reason: Reason,
            consolidation_type: &'static str,
        ) -> DisruptionResult<()> {
            let names = command.candidate_names().into_iter().map(str::to_string).collect();
            self.submitted
                .lock()
                .map_err(|_| DisruptionError::QueueClosed)?
                .push((names, reason, consolidation_type));
            Ok(())
        }

        fn in_flight(&self, node_name: &str) -> bool {
            self.submitted
                .lock()
                .map(|submitted| submitted.iter().any(|(names, _, _)| names.iter().any(|n| n == node_name)))
                .unwrap_or(false)
        }
    }

    fn delete() -> Result<SchedulingResults, SimulationError> {
        Ok(SchedulingResults::default())
    }

    fn controller(harness: &Harness, sim: ScriptedSimulator) -> (DisruptionController, Arc<RecordingQueue>) {
        let queue = Arc::new(RecordingQueue::default());
        let controller = DisruptionController::new(
            harness.collaborators(sim),
            &DisruptionConfig::default(),
            queue.clone(),
        );
        (controller, queue)
    }

    fn add_empty_node(harness: &Harness, name: &str) {
        harness.cluster.put_node_pool(NodePool {
            name: "idle".to_string(),
            disruption: Disruption {
                consolidation_policy: Some(ConsolidationPolicy::WhenEmpty),
                consolidate_after: Some(ConsolidateAfter::After(Duration::from_secs(30))),
                budgets: Vec::new(),
            },
        });
        let mut node = state_node(name, "idle", "m.large", CapacityType::OnDemand, ZONE, Vec::new());
        node.conditions.push(Condition {
            condition_type: ConditionType::Empty,
            status: true,
            last_transition_time: 1_000,
        });
        harness.add_node(node);
    }

    #[test]
    fn emptiness_runs_first() {
        let harness = Harness::new();
        add_empty_node(&harness, "idle-1");
        harness.node("busy-1", "m.large", CapacityType::OnDemand, 1);
        let (mut controller, _) = controller(&harness, ScriptedSimulator::new().with(["busy-1"], delete()));

        let plan = controller.plan().unwrap().unwrap();
        assert_eq!(plan.reason, Reason::Empty);
        assert_eq!(plan.command.candidate_names(), vec!["idle-1"]);
    }

    #[test]
    fn queued_candidates_are_not_planned_again() {
        let harness = Harness::new();
        add_empty_node(&harness, "idle-1");
        let (mut controller, queue) = controller(&harness, ScriptedSimulator::new());

        assert!(controller.reconcile().unwrap());
        harness.clock.step(Duration::from_secs(10));
        assert!(!controller.reconcile().unwrap());

        let submitted = queue.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0], (vec!["idle-1".to_string()], Reason::Empty, ""));
    }

    #[test]
    fn multi_node_runs_before_single_node() {
        let harness = Harness::new();
        for i in 0..10 {
            harness.node(&format!("n{i}"), "m.large", CapacityType::OnDemand, i + 1);
        }
        // Default budget for ten nodes is one, so bump it.
        let mut default = pool("default", ConsolidationPolicy::WhenUnderutilized);
        default.disruption.budgets = vec![Budget::new("5")];
        harness.cluster.put_node_pool(default);

        let sim = ScriptedSimulator::new()
            .with(["n0"], delete())
            .with(["n0", "n1"], delete());
        let (mut controller, queue) = controller(&harness, sim);

        assert!(controller.reconcile().unwrap());
        let submitted = queue.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].0, vec!["n0".to_string(), "n1".to_string()]);
        assert_eq!(submitted[0].1, Reason::Underutilized);
        assert_eq!(submitted[0].2, "multi");
    }

    #[test]
    fn single_node_is_the_fallback() {
        let harness = Harness::new();
        harness.node("only", "m.large", CapacityType::OnDemand, 1);
        let (mut controller, queue) = controller(&harness, ScriptedSimulator::new().with(["only"], delete()));

        assert!(controller.reconcile().unwrap());
        let submitted = queue.submitted.lock().unwrap();
        assert_eq!(submitted[0].2, "single");
    }

    #[test]
    fn deleting_nodes_are_never_candidates() {
        let harness = Harness::new();
        harness.node("going", "m.large", CapacityType::OnDemand, 1);
        harness.cluster.mark_for_deletion("going");
        let sim = Arc::new(ScriptedSimulator::new().with(["going"], delete()));
        let queue = Arc::new(RecordingQueue::default());
        let mut controller = DisruptionController::new(
            harness.collaborators_shared(Arc::clone(&sim)),
            &DisruptionConfig::default(),
            queue.clone(),
        );

        assert!(!controller.reconcile().unwrap());
        assert_eq!(sim.calls(), 0);
        assert!(queue.submitted.lock().unwrap().is_empty());
    }

    #[test]
    fn nothing_to_do_submits_nothing() {
        let harness = Harness::new();
        harness.node("a", "m.large", CapacityType::OnDemand, 1);
        let (mut controller, queue) = controller(&harness, ScriptedSimulator::new());

        assert!(!controller.reconcile().unwrap());
        assert!(queue.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let harness = Harness::new();
        let (mut controller, _) = controller(&harness, ScriptedSimulator::new());
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let handle = tokio::spawn(async move {
            controller.run(Duration::from_secs(10), shutdown_rx).await;
        });
        tokio::time::sleep(Duration::from_secs(35)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
