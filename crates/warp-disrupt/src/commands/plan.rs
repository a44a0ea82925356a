use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use warpgrid_disruption::{
    Collaborators, Command, CommandQueue, DisruptionConfig, DisruptionController, DisruptionMetrics,
    DisruptionResult, DoNotDisruptFilter, EventKind, MemoryRecorder, Reason,
};

use super::snapshot::Snapshot;

/// Queue that only logs what would have been submitted.
struct DryRunQueue;

impl CommandQueue for DryRunQueue {
    fn submit(&self, command: Command, reason: Reason, consolidation_type: &'static str) -> DisruptionResult<()> {
        info!(%command, %reason, consolidation_type, "dry run, command not executed");
        Ok(())
    }

    fn in_flight(&self, _: &str) -> bool {
        false
    }
}

#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub now: u64,
    pub command: Option<CommandView>,
    pub events: Vec<EventView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommandView {
    pub reason: String,
    pub consolidation_type: String,
    pub decision: String,
    pub candidates: Vec<String>,
    pub replacements: Vec<ReplacementView>,
}

#[derive(Debug, Serialize)]
pub struct ReplacementView {
    pub node_pool: String,
    pub instance_types: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EventView {
    pub node: String,
    pub kind: String,
    pub reason: String,
    pub message: String,
}

/// Run one planning pass over `snapshot`.
pub fn build_report(snapshot: Snapshot, config: &DisruptionConfig, with_metrics: bool) -> anyhow::Result<PlanReport> {
    let now = snapshot.now();
    let (clock, cluster, simulator) = snapshot.into_parts();
    let recorder = Arc::new(MemoryRecorder::new());
    let metrics = Arc::new(DisruptionMetrics::new());
    let collaborators = Collaborators {
        clock,
        cluster,
        simulator,
        filter: Arc::new(DoNotDisruptFilter::new(recorder.clone())),
        recorder: recorder.clone(),
        metrics: Arc::clone(&metrics),
    };

    let mut controller = DisruptionController::new(collaborators, config, Arc::new(DryRunQueue));
    let command = controller.plan()?.map(|plan| CommandView {
        reason: plan.reason.to_string(),
        consolidation_type: plan.consolidation_type.to_string(),
        decision: plan.command.decision().to_string(),
        candidates: plan
            .command
            .candidate_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        replacements: plan
            .command
            .replacements
            .iter()
            .map(|r| ReplacementView {
                node_pool: r.node_pool.clone(),
                instance_types: r
                    .instance_type_options
                    .names()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            })
            .collect(),
    });

    let events = recorder
        .events()
        .into_iter()
        .map(|e| EventView {
            node: e.node,
            kind: match e.kind {
                EventKind::Normal => "Normal".to_string(),
                EventKind::Warning => "Warning".to_string(),
            },
            reason: e.reason,
            message: e.message,
        })
        .collect();

    Ok(PlanReport {
        now,
        command,
        events,
        metrics: with_metrics.then(|| metrics.render_prometheus()),
    })
}

pub fn plan(snapshot: &Path, config: Option<&Path>, format: &str, with_metrics: bool) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => DisruptionConfig::from_file(path)?,
        None => DisruptionConfig::default(),
    };
    let report = build_report(Snapshot::from_file(snapshot)?, &config, with_metrics)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => print_text(&report),
    }
    Ok(())
}

fn print_text(report: &PlanReport) {
    println!("Disruption plan at t={}", report.now);
    println!();

    match &report.command {
        Some(cmd) => {
            let kind = if cmd.consolidation_type.is_empty() {
                cmd.reason.clone()
            } else {
                format!("{}/{}", cmd.reason, cmd.consolidation_type)
            };
            println!("  Method:     {kind}");
            println!("  Decision:   {}", cmd.decision);
            println!("  Candidates: {}", cmd.candidates.join(", "));
            for r in &cmd.replacements {
                println!("  Replace in {} with one of [{}]", r.node_pool, r.instance_types.join(", "));
            }
        }
        None => println!("  No disruption command."),
    }

    if !report.events.is_empty() {
        println!();
        println!("Events:");
        for e in &report.events {
            println!("  {:<12} {} {}: {}", e.node, e.kind, e.reason, e.message);
        }
    }

    if let Some(metrics) = &report.metrics {
        println!();
        print!("{metrics}");
    }
}
