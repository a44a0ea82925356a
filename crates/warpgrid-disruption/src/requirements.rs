//! Scheduling requirements attached to replacement node templates.
//!
//! A requirement restricts one label key to a set of allowed values. Adding
//! a requirement for a key that is already constrained intersects the two,
//! so requirements only ever narrow.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::instance_type::CapacityType;

/// Label key carrying the capacity class of a node.
pub const CAPACITY_TYPE_LABEL: &str = "warpgrid.io/capacity-type";

/// Label key carrying the zone of a node.
pub const ZONE_LABEL: &str = "warpgrid.io/zone";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub key: String,
    /// Allowed values. `None` leaves the key unconstrained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeSet<String>>,
}

impl Requirement {
    /// An unconstrained requirement on `key`.
    pub fn any(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: None,
        }
    }

    /// Restrict `key` to exactly the given values.
    pub fn one_of<I, V>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            key: key.into(),
            values: Some(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn capacity_types(types: &[CapacityType]) -> Self {
        Self::one_of(CAPACITY_TYPE_LABEL, types.iter().map(|ct| ct.as_str()))
    }

    pub fn has(&self, value: &str) -> bool {
        match &self.values {
            None => true,
            Some(values) => values.contains(value),
        }
    }

    fn intersect(&self, other: &Requirement) -> Requirement {
        let values = match (&self.values, &other.values) {
            (None, None) => None,
            (Some(v), None) | (None, Some(v)) => Some(v.clone()),
            (Some(a), Some(b)) => Some(a.intersection(b).cloned().collect()),
        };
        Requirement {
            key: self.key.clone(),
            values,
        }
    }
}

/// A set of requirements keyed by label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Requirement>", into = "Vec<Requirement>")]
pub struct Requirements(BTreeMap<String, Requirement>);

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `add`.
    pub fn with(mut self, requirement: Requirement) -> Self {
        self.add(requirement);
        self
    }

    /// The requirement on `key`, unconstrained when none was added.
    pub fn get(&self, key: &str) -> Requirement {
        self.0
            .get(key)
            .cloned()
            .unwrap_or_else(|| Requirement::any(key))
    }

    /// Add a requirement, intersecting with any existing one on the same key.
    pub fn add(&mut self, requirement: Requirement) {
        let merged = match self.0.get(&requirement.key) {
            Some(existing) => existing.intersect(&requirement),
            None => requirement,
        };
        self.0.insert(merged.key.clone(), merged);
    }

    pub fn has(&self, key: &str, value: &str) -> bool {
        self.0.get(key).is_none_or(|r| r.has(value))
    }

    pub fn allows_capacity_type(&self, capacity_type: CapacityType) -> bool {
        self.has(CAPACITY_TYPE_LABEL, capacity_type.as_str())
    }

    pub fn allows_zone(&self, zone: &str) -> bool {
        self.has(ZONE_LABEL, zone)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.0.values()
    }
}

impl From<Vec<Requirement>> for Requirements {
    fn from(requirements: Vec<Requirement>) -> Self {
        let mut out = Requirements::new();
        for r in requirements {
            out.add(r);
        }
        out
    }
}

impl From<Requirements> for Vec<Requirement> {
    fn from(requirements: Requirements) -> Self {
        requirements.0.into_values().collect()
    }
}
