//! Spot-to-spot replacement.
//!
//! Replacing spot capacity with cheaper spot capacity is gated behind a
//! feature flag. A single spot node is only replaced when the launch can
//! choose among at least `MIN_INSTANCE_TYPES_FOR_SPOT_TO_SPOT` cheaper
//! types, and the replacement is limited to that many of the cheapest.

use std::sync::Arc;

use crate::candidate::Candidate;
use crate::command::Command;
use crate::consolidation::Consolidation;
use crate::error::DisruptionResult;
use crate::instance_type::CapacityType;
use crate::requirements::Requirement;
use crate::simulator::NodeClaimTemplate;

/// Cheaper spot types required to replace a single spot node.
pub const MIN_INSTANCE_TYPES_FOR_SPOT_TO_SPOT: usize = 15;

impl Consolidation {
    pub(crate) fn compute_spot_to_spot_consolidation(
        &self,
        candidates: &[Arc<Candidate>],
        mut replacement: NodeClaimTemplate,
        candidate_price: f64,
    ) -> DisruptionResult<Command> {
        if !self.spot_to_spot_enabled() {
            self.unconsolidatable(
                candidates,
                "SpotToSpotConsolidation is disabled, can't replace a spot node with a spot node",
            );
            return Ok(Command::none());
        }

        replacement
            .requirements
            .add(Requirement::capacity_types(&[CapacityType::Spot]));
        replacement.instance_type_options = replacement
            .instance_type_options
            .compatible(&replacement.requirements)
            .filter_by_price(&replacement.requirements, candidate_price);

        if replacement.instance_type_options.is_empty() {
            self.unconsolidatable(candidates, "Can't replace spot node with a cheaper spot node");
            return Ok(Command::none());
        }

        // Multi-node replacement is already strictly cheaper; the
        // flexibility floor only guards single nodes.
        if candidates.len() > 1 {
            return Ok(Command::replace(candidates.to_vec(), replacement));
        }

        let options = replacement.instance_type_options.len();
        if options < MIN_INSTANCE_TYPES_FOR_SPOT_TO_SPOT {
            self.unconsolidatable(
                candidates,
                format!(
                    "SpotToSpotConsolidation requires {MIN_INSTANCE_TYPES_FOR_SPOT_TO_SPOT} cheaper instance type options than the current candidate to consolidate, got {options}"
                ),
            );
            return Ok(Command::none());
        }

        replacement
            .instance_type_options
            .truncate(MIN_INSTANCE_TYPES_FOR_SPOT_TO_SPOT);

        Ok(Command::replace(candidates.to_vec(), replacement))
    }
}
