//! Eligibility Evaluator (§4.5): six accumulating checks over an
//! action definition, user context, schema state, and queue/log
//! history. All failures are collected; the evaluator never
//! short-circuits, since the blocker reason must enumerate every cause.

use brain_core::{eligibility::reasons, ActionDefinition, EligibilityResult, KeyStatus, SchemaState};
use brain_core::{ExecutionLogStore, QueueStore};
use brain_types::{ActionId, Result, SessionId};
use std::collections::HashMap;
use std::sync::Arc;

/// The caller's view of a user for this turn.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub tier: String,
    pub authenticated: bool,
}

/// Fixed predicate table for named `blockers` (§4.5 check 4). A real
/// deployment would consult live account/cart state; the predicates
/// here are evaluated over a caller-supplied flag map so the Brain
/// itself stays free of brand-specific business logic.
pub fn evaluate_blocker(name: &str, flags: &HashMap<String, bool>) -> bool {
    flags.get(name).copied().unwrap_or(false)
}

#[async_trait::async_trait]
pub trait ExecutionHistory: Send + Sync {
    async fn has_completed(&self, session_id: &SessionId, action_id: &ActionId) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait InFlightQueue: Send + Sync {
    async fn has_non_terminal(&self, session_id: &SessionId, action_id: &ActionId) -> Result<bool>;
}

/// Adapts `ExecutionLogStore` to the "has this action already completed
/// for this session" check (§4.5 check 5). Shared by the Turn Pipeline
/// (step D) and the Queue Executor's pre-dispatch re-check (§4.6 step 2)
/// so both evaluate against the same live history.
pub struct LogExecutionHistory(pub Arc<dyn ExecutionLogStore>);

#[async_trait::async_trait]
impl ExecutionHistory for LogExecutionHistory {
    async fn has_completed(&self, session_id: &SessionId, action_id: &ActionId) -> Result<bool> {
        self.0.find_completed_for_action(session_id, action_id).await
    }
}

/// Adapts `QueueStore` to the "is there a non-terminal entry for this
/// opposite action" check (§4.5 check 6).
pub struct QueueInFlight(pub Arc<dyn QueueStore>);

#[async_trait::async_trait]
impl InFlightQueue for QueueInFlight {
    async fn has_non_terminal(&self, session_id: &SessionId, action_id: &ActionId) -> Result<bool> {
        Ok(self.0.list_restorable(session_id).await?.iter().any(|e| &e.action_id == action_id))
    }
}

pub struct EligibilityEvaluator;

impl EligibilityEvaluator {
    /// Evaluates every check for `action` against the supplied context.
    /// `schema_states` must already contain a fresh/stale/error entry
    /// for every schema the action depends on (the caller — Turn
    /// Pipeline step D — is responsible for that fetch).
    pub async fn evaluate(
        session_id: &SessionId,
        action: &ActionDefinition,
        user: &UserContext,
        schema_states: &HashMap<String, SchemaState>,
        blocker_flags: &HashMap<String, bool>,
        history: &dyn ExecutionHistory,
        queue: &dyn InFlightQueue,
    ) -> Result<EligibilityResult> {
        let mut reasons_failed = Vec::new();

        // 1. user tier restriction.
        if !action.eligibility.user_tiers.is_empty()
            && !action.eligibility.user_tiers.contains(&user.tier)
        {
            reasons_failed.push(reasons::user_tier_not_allowed(&user.tier));
        }

        // 2. auth requirement.
        if action.eligibility.requires_auth && !user.authenticated {
            reasons_failed.push(reasons::requires_auth());
        }

        // 3. schema dependencies.
        for dep in &action.eligibility.schema_dependencies {
            let state = schema_states.get(dep.schema_id.as_str());
            for key_name in &dep.required_keys {
                let satisfied = state
                    .map(|s| s.key_status(key_name) == dep.all_must_be)
                    .unwrap_or(false);
                if !satisfied {
                    reasons_failed.push(reasons::schema_dependency_failed(
                        dep.schema_id.as_str(),
                        key_name,
                    ));
                }
            }
        }

        // 4. named blocker predicates.
        for blocker in &action.eligibility.blockers {
            if evaluate_blocker(blocker, blocker_flags) {
                reasons_failed.push(reasons::blocker_active(blocker));
            }
        }

        // 5. action dependencies: at least one completed execution.
        for dependency in &action.eligibility.dependencies {
            if !history.has_completed(session_id, dependency).await? {
                reasons_failed.push(reasons::dependency_not_completed(dependency.as_str()));
            }
        }

        // 6. conflicting opposites: no non-terminal queue entry.
        for opposite in &action.eligibility.opposites {
            if queue.has_non_terminal(session_id, opposite).await? {
                reasons_failed.push(reasons::conflicting_opposite_action(opposite.as_str()));
            }
        }

        Ok(EligibilityResult::with_reasons(reasons_failed))
    }
}

/// A Schema State is treated as failing every required-key check for
/// its schema when the last fetch was `stale` or `error` (§4.5 check
/// 3); `key_status` on a non-`complete` state already reflects that
/// because `derive`/`synthetic_error` only ever populate `complete`
/// statuses on a successful fetch.
pub fn schema_dependency_key_satisfied(state: &SchemaState, key_name: &str, required: KeyStatus) -> bool {
    state.key_status(key_name) == required
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_core::{ApiStatus, SchemaState};
    use brain_types::SchemaId;
    use std::collections::HashMap as Map;

    struct AlwaysCompleted;
    #[async_trait::async_trait]
    impl ExecutionHistory for AlwaysCompleted {
        async fn has_completed(&self, _: &SessionId, _: &ActionId) -> Result<bool> {
            Ok(true)
        }
    }

    struct NeverInFlight;
    #[async_trait::async_trait]
    impl InFlightQueue for NeverInFlight {
        async fn has_non_terminal(&self, _: &SessionId, _: &ActionId) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn stale_schema_state_fails_dependency_check() {
        use brain_core::{Eligibility, ParamValidation, Priority, RetryPolicy, SchemaDependency};
        use brain_types::{ActionId, InstanceId};
        use std::collections::HashSet;

        let mut eligibility = Eligibility::default();
        eligibility.schema_dependencies.push(SchemaDependency {
            schema_id: SchemaId::from("profile"),
            required_keys: vec!["phone".to_string()],
            all_must_be: KeyStatus::Complete,
        });

        let action = ActionDefinition {
            instance_id: InstanceId::from("inst"),
            action_id: ActionId::from("process_payment"),
            canonical_name: "process_payment".to_string(),
            synonyms: HashSet::new(),
            params_required: vec![],
            params_optional: vec![],
            param_validation: Map::<String, ParamValidation>::new(),
            eligibility,
            retry_policy: RetryPolicy::default(),
            timeout_ms: 5_000,
            workflow_id: None,
            sequence_id: None,
            triggers_workflow: false,
            priority: Priority::Normal,
            rollback_action_id: None,
            requires_user_ack: false,
            critical: false,
            is_active: true,
            api_endpoint: "https://example.test/pay".to_string(),
            api_method: "POST".to_string(),
            success_criteria: "status_code == 200".to_string(),
            failure_criteria: None,
        };

        let state = SchemaState::synthetic_error(
            SessionId::from("s1"),
            SchemaId::from("profile"),
            chrono::Utc::now(),
            &["phone".to_string()],
        );
        assert_eq!(state.api_status, ApiStatus::Error);

        let mut states = Map::new();
        states.insert("profile".to_string(), state);

        let user = UserContext {
            tier: "standard".to_string(),
            authenticated: true,
        };

        let result = EligibilityEvaluator::evaluate(
            &SessionId::from("s1"),
            &action,
            &user,
            &states,
            &Map::new(),
            &AlwaysCompleted,
            &NeverInFlight,
        )
        .await
        .unwrap();

        assert!(!result.eligible);
        assert!(result.reasons.contains(&"schema_dependency_failed:profile.phone".to_string()));
    }
}
