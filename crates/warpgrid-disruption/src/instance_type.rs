//! Instance-type catalog: capacity classes, priced offerings, and the
//! ordered option lists carried by replacement node templates.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::requirements::Requirements;

/// Purchasing class of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityType {
    /// Interruptible, discounted capacity.
    Spot,
    OnDemand,
}

impl CapacityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityType::Spot => "spot",
            CapacityType::OnDemand => "on-demand",
        }
    }
}

impl fmt::Display for CapacityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchasable (capacity type, zone) pair for an instance type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub capacity_type: CapacityType,
    pub zone: String,
    /// Hourly price.
    pub price: f64,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offerings(Vec<Offering>);

impl Offerings {
    pub fn new(offerings: Vec<Offering>) -> Self {
        Self(offerings)
    }

    /// Price lookup for a running node.
    pub fn get(&self, capacity_type: CapacityType, zone: &str) -> Option<&Offering> {
        self.0
            .iter()
            .find(|o| o.capacity_type == capacity_type && o.zone == zone)
    }

    pub fn available(&self) -> impl Iterator<Item = &Offering> {
        self.0.iter().filter(|o| o.available)
    }

    /// Available offerings a node with `reqs` could launch into.
    pub fn compatible<'a>(&'a self, reqs: &'a Requirements) -> impl Iterator<Item = &'a Offering> {
        self.available().filter(|o| {
            reqs.allows_capacity_type(o.capacity_type) && reqs.allows_zone(&o.zone)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Offering> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    pub name: String,
    pub offerings: Offerings,
}

impl InstanceType {
    /// The most we might pay when launching this type under `reqs`.
    ///
    /// Spot is preferred at launch, so when the requirements permit spot
    /// and a spot offering exists the worst spot price is used; otherwise
    /// the worst on-demand price. A type with no usable offering is
    /// priced at infinity and is never cheaper than anything.
    pub fn launch_price(&self, reqs: &Requirements) -> f64 {
        for capacity_type in [CapacityType::Spot, CapacityType::OnDemand] {
            if !reqs.allows_capacity_type(capacity_type) {
                continue;
            }
            let worst = self
                .offerings
                .compatible(reqs)
                .filter(|o| o.capacity_type == capacity_type)
                .map(|o| o.price)
                .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))));
            if let Some(price) = worst {
                return price;
            }
        }
        f64::INFINITY
    }
}

/// Ranked list of instance types acceptable for one replacement node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceTypeOptions(Vec<InstanceType>);

impl InstanceTypeOptions {
    pub fn new(options: Vec<InstanceType>) -> Self {
        Self(options)
    }

    /// Types with at least one available offering satisfying `reqs`.
    pub fn compatible(&self, reqs: &Requirements) -> Self {
        Self(
            self.0
                .iter()
                .filter(|it| it.offerings.compatible(reqs).next().is_some())
                .cloned()
                .collect(),
        )
    }

    /// Types whose launch price is strictly below `threshold`, cheapest
    /// first. Equal price is not cheaper.
    pub fn filter_by_price(&self, reqs: &Requirements, threshold: f64) -> Self {
        let kept = Self(
            self.0
                .iter()
                .filter(|it| it.launch_price(reqs) < threshold)
                .cloned()
                .collect(),
        );
        kept.order_by_price(reqs)
    }

    /// Stable ascending sort by launch price.
    pub fn order_by_price(&self, reqs: &Requirements) -> Self {
        let mut priced: Vec<(f64, InstanceType)> = self
            .0
            .iter()
            .map(|it| (it.launch_price(reqs), it.clone()))
            .collect();
        priced.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        Self(priced.into_iter().map(|(_, it)| it).collect())
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub fn retain(&mut self, f: impl FnMut(&InstanceType) -> bool) {
        self.0.retain(f);
    }

    /// Whether any type name appears in both lists.
    pub fn intersects(&self, other: &InstanceTypeOptions) -> bool {
        self.0
            .iter()
            .any(|a| other.0.iter().any(|b| a.name == b.name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|it| it.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceType> {
        self.0.iter()
    }
}

impl FromIterator<InstanceType> for InstanceTypeOptions {
    fn from_iter<T: IntoIterator<Item = InstanceType>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
