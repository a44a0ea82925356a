//! Command: the output of a planning pass.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::candidate::Candidate;
use crate::simulator::NodeClaimTemplate;

/// What a command will do when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    NoOp,
    Delete,
    Replace,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::NoOp => "no-op",
            Decision::Delete => "delete",
            Decision::Replace => "replace",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidates to remove and the nodes to launch in their place.
///
/// Commands produced by the consolidation planners never carry more than
/// one replacement. A command without candidates is a no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub candidates: Vec<Arc<Candidate>>,
    pub replacements: Vec<NodeClaimTemplate>,
}

impl Command {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn delete(candidates: Vec<Arc<Candidate>>) -> Self {
        Self {
            candidates,
            replacements: Vec::new(),
        }
    }

    pub fn replace(candidates: Vec<Arc<Candidate>>, replacement: NodeClaimTemplate) -> Self {
        Self {
            candidates,
            replacements: vec![replacement],
        }
    }

    pub fn decision(&self) -> Decision {
        match (self.candidates.is_empty(), self.replacements.is_empty()) {
            (true, _) => Decision::NoOp,
            (false, true) => Decision::Delete,
            (false, false) => Decision::Replace,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidate_names(&self) -> Vec<&str> {
        self.candidates.iter().map(|c| c.name()).collect()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.decision())?;
        if self.candidates.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = self.candidates.iter().map(|c| c.to_string()).collect();
        write!(f, ", terminating {} nodes ({})", names.len(), names.join(", "))?;
        if let Some(replacement) = self.replacements.first() {
            let options = replacement.instance_type_options.names();
            write!(
                f,
                " and replacing with a node from types [{}]",
                options.join(", ")
            )?;
        }
        Ok(())
    }
}
