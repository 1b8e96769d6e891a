//! Shared types for the Eligibility Evaluator's accumulating checks
//! (§4.5). The evaluation logic itself lives in `brain-cognitive`,
//! which is stateful (it consults live Schema State and the in-flight
//! queue); this module holds the pure result shape and stable reason
//! identifiers so the Narrative Builder can template off them without
//! depending on the evaluator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub eligible: bool,
    pub reasons: Vec<String>,
}

impl EligibilityResult {
    pub fn eligible() -> Self {
        Self {
            eligible: true,
            reasons: Vec::new(),
        }
    }

    pub fn with_reasons(reasons: Vec<String>) -> Self {
        Self {
            eligible: reasons.is_empty(),
            reasons,
        }
    }
}

/// Stable reason-identifier builders, one per Eligibility Evaluator
/// check (§4.5), used for narrative templating.
pub mod reasons {
    pub fn user_tier_not_allowed(tier: &str) -> String {
        format!("user_tier_not_allowed:{tier}")
    }

    pub fn requires_auth() -> String {
        "requires_auth".to_string()
    }

    pub fn schema_dependency_failed(schema_id: &str, key_name: &str) -> String {
        format!("schema_dependency_failed:{schema_id}.{key_name}")
    }

    pub fn blocker_active(blocker_name: &str) -> String {
        format!("blocker_active:{blocker_name}")
    }

    pub fn dependency_not_completed(action_id: &str) -> String {
        format!("dependency_not_completed:{action_id}")
    }

    pub fn conflicting_opposite_action(action_id: &str) -> String {
        format!("conflicting_opposite_action:{action_id}")
    }
}
