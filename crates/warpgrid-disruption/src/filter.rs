//! Candidate viability filtering applied before consolidation ordering.

use std::sync::Arc;

use tracing::debug;

use crate::candidate::Candidate;
use crate::error::DisruptionResult;
use crate::events::{Event, Recorder};
use crate::types::DO_NOT_DISRUPT_ANNOTATION;

/// Removes candidates that are known not to be consolidation options.
pub trait CandidateFilter: Send + Sync {
    fn filter(&self, candidates: Vec<Arc<Candidate>>) -> DisruptionResult<Vec<Arc<Candidate>>>;
}

/// Drops candidates hosting a pod annotated `warpgrid.io/do-not-disrupt`.
pub struct DoNotDisruptFilter {
    recorder: Arc<dyn Recorder>,
}

impl DoNotDisruptFilter {
    pub fn new(recorder: Arc<dyn Recorder>) -> Self {
        Self { recorder }
    }
}

impl CandidateFilter for DoNotDisruptFilter {
    fn filter(&self, candidates: Vec<Arc<Candidate>>) -> DisruptionResult<Vec<Arc<Candidate>>> {
        Ok(candidates
            .into_iter()
            .filter(|c| {
                let blocking = c.pods().iter().find(|p| {
                    p.annotations
                        .get(DO_NOT_DISRUPT_ANNOTATION)
                        .is_some_and(|v| v == "true")
                });
                match blocking {
                    Some(pod) => {
                        debug!(node = %c.name(), pod = %pod.key(), "pod blocks disruption");
                        self.recorder.publish(Event::unconsolidatable(
                            c,
                            format!("pod {:?} has {DO_NOT_DISRUPT_ANNOTATION} annotation", pod.key()),
                        ));
                        false
                    }
                    None => true,
                }
            })
            .collect())
    }
}

/// Keeps every candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl CandidateFilter for AllowAll {
    fn filter(&self, candidates: Vec<Arc<Candidate>>) -> DisruptionResult<Vec<Arc<Candidate>>> {
        Ok(candidates)
    }
}
