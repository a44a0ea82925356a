//! Explanatory events for users.
//!
//! Publishing is fire-and-forget: a recorder must never block the planner
//! and may drop events under pressure.

use std::sync::Mutex;

use tracing::info;

use crate::candidate::Candidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// An event attached to a node and its claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub node: String,
    pub node_claim: String,
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

impl Event {
    /// The candidate was considered and not disrupted.
    pub fn unconsolidatable(candidate: &Candidate, message: impl Into<String>) -> Self {
        Self {
            node: candidate.name().to_string(),
            node_claim: candidate.node_claim().to_string(),
            kind: EventKind::Normal,
            reason: "Unconsolidatable".to_string(),
            message: message.into(),
        }
    }
}

/// Sink for events.
pub trait Recorder: Send + Sync {
    fn publish(&self, event: Event);
}

/// Writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl Recorder for TracingRecorder {
    fn publish(&self, event: Event) {
        info!(
            node = %event.node,
            node_claim = %event.node_claim,
            reason = %event.reason,
            kind = ?event.kind,
            "{}",
            event.message
        );
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<Event>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Recorder for MemoryRecorder {
    fn publish(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
