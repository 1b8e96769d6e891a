//! Action Definition — the read-only, per-instance catalog entry
//! consumed by the Action Resolver, Eligibility Evaluator, and Action
//! Queue & Executor (§3, §4.3).

use brain_types::{ActionId, InstanceId, SchemaId, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// Which key statuses a schema dependency requires. `required_keys`
/// names the keys to check; every one of them must hold the status in
/// `all_must_be` for the dependency to be satisfied (§4.5 check 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDependency {
    pub schema_id: SchemaId,
    pub required_keys: Vec<String>,
    pub all_must_be: crate::schema::KeyStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Eligibility {
    /// Empty means unrestricted (any tier is eligible).
    pub user_tiers: HashSet<String>,
    pub requires_auth: bool,
    pub schema_dependencies: Vec<SchemaDependency>,
    pub blockers: Vec<String>,
    pub dependencies: Vec<ActionId>,
    pub opposites: Vec<ActionId>,
}

impl Default for Eligibility {
    fn default() -> Self {
        Self {
            user_tiers: HashSet::new(),
            requires_auth: false,
            schema_dependencies: Vec::new(),
            blockers: Vec::new(),
            dependencies: Vec::new(),
            opposites: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    ExponentialBackoff,
    FixedDelay,
}

/// Exponential backoff defaults per §4.6: 2s, 4s, 8s, 16s, cap 60s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub strategy: RetryStrategy,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub retry_on_errors: HashSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            strategy: RetryStrategy::ExponentialBackoff,
            initial_delay_ms: 2_000,
            max_delay_ms: 60_000,
            retry_on_errors: ["external_transient".to_string()].into_iter().collect(),
        }
    }
}

impl RetryPolicy {
    /// `delay = min(max_delay_ms, initial_delay_ms * 2^(retry_count - 1))`,
    /// per §4.6 and the exponential-backoff boundary test P3.
    pub fn backoff_delay_ms(&self, retry_count: u32) -> u64 {
        let exponent = retry_count.saturating_sub(1);
        let scaled = self
            .initial_delay_ms
            .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX));
        scaled.min(self.max_delay_ms)
    }

    pub fn is_retryable_error(&self, error_kind: &str) -> bool {
        self.retry_on_errors.contains(error_kind)
    }
}

/// The kind of structured value a missing parameter's answer sheet
/// should present (§4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamValidation {
    Confirmation {
        yes_aliases: Vec<String>,
        no_aliases: Vec<String>,
    },
    SingleChoice {
        options: Vec<ChoiceOption>,
    },
    MultipleChoice {
        options: Vec<ChoiceOption>,
        min_selections: u32,
        max_selections: u32,
    },
    Entity {
        format_regex: String,
    },
    Text {
        min_length: u32,
        max_length: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub instance_id: InstanceId,
    pub action_id: ActionId,
    pub canonical_name: String,
    pub synonyms: HashSet<String>,
    pub params_required: Vec<String>,
    pub params_optional: Vec<String>,
    pub param_validation: HashMap<String, ParamValidation>,
    pub eligibility: Eligibility,
    pub retry_policy: RetryPolicy,
    pub timeout_ms: u64,
    pub workflow_id: Option<WorkflowId>,
    pub sequence_id: Option<String>,
    pub triggers_workflow: bool,
    pub priority: Priority,
    pub rollback_action_id: Option<ActionId>,
    pub requires_user_ack: bool,
    pub critical: bool,
    pub is_active: bool,
    pub api_endpoint: String,
    pub api_method: String,
    /// Outcome-classification predicate evaluated against the call's
    /// status code and response body (§4.6 step 5), e.g.
    /// `status_code == 200 AND body contains "payment_id"`.
    pub success_criteria: String,
    /// When present and it matches, the call is classified as failed
    /// even if `success_criteria` also matched (§4.6 step 5).
    pub failure_criteria: Option<String>,
}

impl ActionDefinition {
    /// `params_missing = params_required - entities.keys` (§4.1 step E).
    pub fn missing_params(&self, collected_keys: &HashSet<String>) -> Vec<String> {
        self.params_required
            .iter()
            .filter(|p| !collected_keys.contains(*p))
            .cloned()
            .collect()
    }
}
