//! Per-pool disruption budgets for one planning pass.
//!
//! A `DisruptionBudgets` value is built at the start of a pass and passed
//! by `&mut` into each planner. Planners only ever consume from it. The
//! quota is signed so a mis-computed negative value is representable, and
//! consumption always checks `> 0`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::cluster::PoolUsage;
use crate::types::{Budget, NodePool};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisruptionBudgets {
    remaining: HashMap<String, i64>,
}

impl DisruptionBudgets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the remaining budget of every pool.
    ///
    /// For each pool the most restrictive budget wins; nodes already being
    /// disrupted count against it. A malformed budget allows nothing.
    pub fn build(pools: &[Arc<NodePool>], usage: &HashMap<String, PoolUsage>) -> Self {
        let default_budget = [Budget::new(Budget::DEFAULT_NODES)];
        let mut remaining = HashMap::with_capacity(pools.len());

        for pool in pools {
            let PoolUsage { total, disrupting } = usage.get(&pool.name).copied().unwrap_or_default();
            let budgets: &[Budget] = if pool.disruption.budgets.is_empty() {
                &default_budget
            } else {
                &pool.disruption.budgets
            };

            let allowed = budgets
                .iter()
                .map(|b| match b.allowed(total) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(pool = %pool.name, error = %e, "ignoring malformed disruption budget");
                        0
                    }
                })
                .min()
                .unwrap_or(0);

            let left = (allowed as i64 - disrupting as i64).max(0);
            remaining.insert(pool.name.clone(), left);
        }

        Self { remaining }
    }

    pub fn set(&mut self, pool: &str, quota: i64) {
        self.remaining.insert(pool.to_string(), quota);
    }

    /// Remaining quota; unknown pools have none.
    pub fn get(&self, pool: &str) -> i64 {
        self.remaining.get(pool).copied().unwrap_or(0)
    }

    pub fn has_budget(&self, pool: &str) -> bool {
        self.get(pool) > 0
    }

    /// Take one unit of `pool`'s budget if any is left.
    pub fn try_consume(&mut self, pool: &str) -> bool {
        match self.remaining.get_mut(pool) {
            Some(quota) if *quota > 0 => {
                *quota -= 1;
                true
            }
            _ => false,
        }
    }
}

impl<S: Into<String>> FromIterator<(S, i64)> for DisruptionBudgets {
    fn from_iter<T: IntoIterator<Item = (S, i64)>>(iter: T) -> Self {
        Self {
            remaining: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
