//! Action Queue & Executor (§4.6): drains the per-session priority
//! queue in `(priority desc, added_at asc)` order, adopting idempotent
//! replays, re-checking eligibility immediately before dispatch, and
//! classifying outcomes into completed / retrying / dead-lettered.

use brain_core::{
    queue_processing_order, ActionDefinition, DlqEntry, EscalationSink, ExecutionLogEntry,
    ExecutionStatus, QueueEntry, QueueStatus,
};
use brain_core::{ActionExecutorClient, DlqStore, ExecutionLogStore, QueueStore, SchemaRegistryStore, WorkflowInstanceStore};
use brain_types::{BrainError, BrandId, Result, SessionId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::eligibility::{EligibilityEvaluator, LogExecutionHistory, QueueInFlight, UserContext};
use crate::schema_cache::SchemaStateCache;
use crate::streaming::StreamingBus;
use crate::workflow::WorkflowEngine;
use brain_core::StreamingUpdateType;

pub struct QueueExecutor {
    queue_store: Arc<dyn QueueStore>,
    execution_log: Arc<dyn ExecutionLogStore>,
    dlq_store: Arc<dyn DlqStore>,
    client: Arc<dyn ActionExecutorClient>,
    escalation: Arc<dyn EscalationSink>,
    streaming: Arc<StreamingBus>,
    brand_id: BrandId,
    schemas: Arc<dyn SchemaRegistryStore>,
    schema_cache: Arc<SchemaStateCache>,
    workflow_instances: Arc<dyn WorkflowInstanceStore>,
    workflow_engine: Arc<WorkflowEngine>,
}

/// Outcome of a single entry's processing pass, surfaced for the Turn
/// Pipeline to fold into narrative/wire updates.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Completed { result: serde_json::Value },
    Retrying { delay_ms: u64 },
    DeadLettered { dlq_id: brain_types::DlqId },
    Blocked,
}

impl QueueExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue_store: Arc<dyn QueueStore>,
        execution_log: Arc<dyn ExecutionLogStore>,
        dlq_store: Arc<dyn DlqStore>,
        client: Arc<dyn ActionExecutorClient>,
        escalation: Arc<dyn EscalationSink>,
        streaming: Arc<StreamingBus>,
        brand_id: BrandId,
        schemas: Arc<dyn SchemaRegistryStore>,
        schema_cache: Arc<SchemaStateCache>,
        workflow_instances: Arc<dyn WorkflowInstanceStore>,
        workflow_engine: Arc<WorkflowEngine>,
    ) -> Self {
        Self {
            queue_store,
            execution_log,
            dlq_store,
            client,
            escalation,
            streaming,
            brand_id,
            schemas,
            schema_cache,
            workflow_instances,
            workflow_engine,
        }
    }

    /// Runs one processing pass over a session's restorable entries,
    /// in priority order. `action` must resolve to the entry's
    /// `action_id` (callers hold the registry lookup).
    pub async fn process_session(
        &self,
        session_id: &SessionId,
        resolve_action: impl Fn(&brain_types::ActionId) -> Option<ActionDefinition>,
    ) -> Result<Vec<(brain_types::QueueId, ProcessOutcome)>> {
        let mut entries = self.queue_store.list_restorable(session_id).await?;
        entries.sort_by(queue_processing_order);

        let now = chrono::Utc::now();
        let mut outcomes = Vec::new();
        for mut entry in entries {
            if !entry.is_eligible(now) {
                continue;
            }
            let Some(action) = resolve_action(&entry.action_id) else {
                warn!(action_id = %entry.action_id, "queue entry references unknown action");
                continue;
            };
            let outcome = self.process_entry(&mut entry, &action, &resolve_action).await?;
            outcomes.push((entry.queue_id.clone(), outcome));
        }
        Ok(outcomes)
    }

    /// Steps 1-6 of §4.6 for a single entry. `resolve_action` also
    /// drives this entry's workflow notification (§4.8): entries drained
    /// by a later pass than the one that enqueued them (a subsequent
    /// turn, or the background sweep) still need a live action lookup to
    /// fold their outcome back into the workflow instance.
    async fn process_entry(
        &self,
        entry: &mut QueueEntry,
        action: &ActionDefinition,
        resolve_action: &impl Fn(&brain_types::ActionId) -> Option<ActionDefinition>,
    ) -> Result<ProcessOutcome> {
        // Step 1: idempotency adoption. If a completed execution for
        // this exact key already exists, adopt its result instead of
        // re-calling the brand API.
        if let Some(prior) = self
            .execution_log
            .find_completed_by_idempotency_key(&entry.idempotency_key)
            .await?
        {
            entry.checkpoint(QueueStatus::Completed);
            self.queue_store.checkpoint(entry).await?;
            self.notify_workflow(entry, true, resolve_action).await?;
            return Ok(ProcessOutcome::Completed {
                result: prior.result.unwrap_or(serde_json::Value::Null),
            });
        }

        // Step 2: eligibility is re-checked immediately before dispatch.
        // A prior turn's enqueue does not guarantee this entry is still
        // eligible by the time a later pass (a subsequent turn's drain,
        // or the background sweep) pulls it off the queue, so the same
        // checks run again here against the triggering turn's user
        // context snapshot. Named-blocker flags are not re-evaluated
        // (they require a live caller-supplied flag map this pass does
        // not have) — an action with no named blockers is unaffected.
        let user = UserContext {
            tier: entry.user_tier.clone(),
            authenticated: entry.authenticated,
        };
        let mut schema_states = HashMap::new();
        for dep in &action.eligibility.schema_dependencies {
            if let Some(schema) = self.schemas.get_schema(&self.brand_id, &dep.schema_id).await? {
                let state = self.schema_cache.get(&entry.session_id, &schema, false).await?;
                schema_states.insert(dep.schema_id.as_str().to_string(), state);
            }
        }
        let history = LogExecutionHistory(self.execution_log.clone());
        let in_flight = QueueInFlight(self.queue_store.clone());
        let eligibility = EligibilityEvaluator::evaluate(
            &entry.session_id,
            action,
            &user,
            &schema_states,
            &HashMap::new(),
            &history,
            &in_flight,
        )
        .await?;
        if !eligibility.eligible {
            entry.checkpoint(QueueStatus::Blocked);
            self.queue_store.checkpoint(entry).await?;
            return Ok(ProcessOutcome::Blocked);
        }

        // Step 3: ready -> executing, with an Execution Log write.
        entry.checkpoint(QueueStatus::Executing);
        self.queue_store.checkpoint(entry).await?;
        self.streaming
            .emit(
                &entry.session_id,
                StreamingUpdateType::ActionExecuting,
                serde_json::json!({ "action_id": action.action_id.as_str() }),
            )
            .await;

        let mut log_entry = ExecutionLogEntry::start(
            entry.queue_id.clone(),
            entry.action_id.clone(),
            entry.session_id.clone(),
            entry.retry_count,
            entry.params_collected.clone(),
            entry.idempotency_key.clone(),
        );
        self.execution_log.append(&log_entry).await?;

        // Step 4: external call under the action's timeout, with
        // periodic progress emission while it runs.
        let progress = self.emit_progress_while(entry.session_id.clone(), action.action_id.clone());
        let timeout = tokio::time::Duration::from_millis(action.timeout_ms);
        let call_result = tokio::time::timeout(timeout, self.client.execute(action, &entry.params_collected)).await;
        progress.abort();
        let outcome = match call_result {
            Ok(inner) => inner,
            Err(_) => Err(BrainError::ExternalTransient("action call timed out".to_string())),
        };

        // Step 5: classify the outcome.
        match outcome {
            Ok(result) => {
                log_entry.complete(result.clone());
                self.execution_log.update(&log_entry).await?;
                entry.checkpoint(QueueStatus::Completed);
                self.queue_store.checkpoint(entry).await?;
                self.streaming
                    .emit(
                        &entry.session_id,
                        StreamingUpdateType::ActionCompleted,
                        serde_json::json!({ "action_id": action.action_id.as_str() }),
                    )
                    .await;
                self.notify_workflow(entry, true, resolve_action).await?;
                Ok(ProcessOutcome::Completed { result })
            }
            Err(err) => self.handle_failure(entry, action, &mut log_entry, err, resolve_action).await,
        }
    }

    async fn handle_failure(
        &self,
        entry: &mut QueueEntry,
        action: &ActionDefinition,
        log_entry: &mut ExecutionLogEntry,
        err: BrainError,
        resolve_action: &impl Fn(&brain_types::ActionId) -> Option<ActionDefinition>,
    ) -> Result<ProcessOutcome> {
        let error_kind = err.kind().to_string();
        log_entry.fail(ExecutionStatus::Failed, err.to_string());
        self.execution_log.update(log_entry).await?;

        let retryable = action.retry_policy.is_retryable_error(&error_kind) && !entry.retries_exhausted();
        if retryable {
            let delay_ms = action.retry_policy.backoff_delay_ms(entry.retry_count + 1);
            entry.schedule_retry(delay_ms, err.to_string());
            self.queue_store.checkpoint(entry).await?;
            self.streaming
                .emit(
                    &entry.session_id,
                    StreamingUpdateType::ActionFailed,
                    serde_json::json!({ "action_id": action.action_id.as_str(), "retrying": true }),
                )
                .await;
            return Ok(ProcessOutcome::Retrying { delay_ms });
        }

        // Retries exhausted or the error is non-retryable: move to the
        // Dead-Letter Store.
        entry.checkpoint(QueueStatus::Failed);
        self.queue_store.checkpoint(entry).await?;
        self.notify_workflow(entry, false, resolve_action).await?;

        let mut dlq_entry = DlqEntry::new(
            entry.queue_id.clone(),
            entry.action_id.clone(),
            err.to_string(),
            entry.retry_errors.clone(),
            true,
        );
        self.dlq_store.insert(&dlq_entry).await?;

        if action.critical {
            match self
                .escalation
                .escalate(&dlq_entry.dlq_id, &entry.action_id, &dlq_entry.final_error)
                .await
            {
                Ok(ticket_ref) => {
                    dlq_entry.escalation_ticket_id = Some(ticket_ref);
                    self.dlq_store.update(&dlq_entry).await?;
                }
                Err(escalation_err) => {
                    warn!(error = %escalation_err, "escalation sink failed, dlq entry left unflagged");
                }
            }
        }

        self.streaming
            .emit(
                &entry.session_id,
                StreamingUpdateType::ActionFailed,
                serde_json::json!({ "action_id": action.action_id.as_str(), "retrying": false }),
            )
            .await;
        info!(dlq_id = %dlq_entry.dlq_id, action_id = %entry.action_id, "action moved to dead-letter store");
        Ok(ProcessOutcome::DeadLettered { dlq_id: dlq_entry.dlq_id })
    }

    /// Emits `action_progress` roughly every 3 seconds for as long as
    /// the external call runs. Spawned as its own task so the timeout
    /// select above can abort it the moment the call resolves.
    fn emit_progress_while(&self, session_id: SessionId, action_id: brain_types::ActionId) -> tokio::task::JoinHandle<()> {
        let streaming = self.streaming.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(3)).await;
                streaming
                    .emit(
                        &session_id,
                        StreamingUpdateType::ActionProgress,
                        serde_json::json!({ "action_id": action_id.as_str() }),
                    )
                    .await;
            }
        })
    }

    /// Folds this entry's terminal outcome back into its workflow step
    /// (§4.8), when it was enqueued on behalf of one. A no-op for
    /// entries with no `workflow_instance_id`, or whose instance has no
    /// step recorded against this queue entry.
    async fn notify_workflow(
        &self,
        entry: &QueueEntry,
        succeeded: bool,
        resolve_action: &impl Fn(&brain_types::ActionId) -> Option<ActionDefinition>,
    ) -> Result<()> {
        let Some(workflow_instance_id) = entry.workflow_instance_id else {
            return Ok(());
        };
        let Some(instance) = self.workflow_instances.get(&workflow_instance_id).await? else {
            return Ok(());
        };
        let Some(step) = instance.step_for_queue_id(&entry.queue_id) else {
            return Ok(());
        };
        self.workflow_engine
            .on_step_outcome(&workflow_instance_id, &step.sequence_id, succeeded, resolve_action)
            .await
    }

    /// Crash recovery (§4.6): entries left `executing` with no
    /// completed Execution Log entry were abandoned mid-call by a prior
    /// process and are restarted as an immediate retry.
    pub async fn recover_abandoned(&self) -> Result<usize> {
        let mut recovered = 0;
        for mut entry in self.queue_store.list_all_restorable().await? {
            if entry.status != QueueStatus::Executing {
                continue;
            }
            let has_completed = self
                .execution_log
                .find_completed_for_action(&entry.session_id, &entry.action_id)
                .await?;
            if has_completed {
                entry.checkpoint(QueueStatus::Completed);
            } else {
                entry.next_retry_at = Some(chrono::Utc::now());
                entry.checkpoint(QueueStatus::Retrying);
            }
            self.queue_store.checkpoint(&entry).await?;
            recovered += 1;
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use brain_core::{
        Eligibility, ParamValidation, Priority, RetryPolicy, SchemaDefinition, SchemaFetcher,
        WorkflowDefinition, WorkflowInstance, WorkflowRegistryStore,
    };
    use brain_types::{ActionId, DlqId, ExecutionId, IdempotencyKey, InstanceId, QueueId, SchemaId, WorkflowId, WorkflowInstanceId};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryQueue {
        entries: Mutex<HashMap<String, QueueEntry>>,
    }

    #[async_trait]
    impl QueueStore for InMemoryQueue {
        async fn insert(&self, entry: &QueueEntry) -> Result<()> {
            self.entries.lock().unwrap().insert(entry.queue_id.to_string(), entry.clone());
            Ok(())
        }
        async fn checkpoint(&self, entry: &QueueEntry) -> Result<()> {
            self.entries.lock().unwrap().insert(entry.queue_id.to_string(), entry.clone());
            Ok(())
        }
        async fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<QueueEntry>> {
            Ok(self.entries.lock().unwrap().values().find(|e| &e.idempotency_key == key).cloned())
        }
        async fn get(&self, queue_id: &QueueId) -> Result<Option<QueueEntry>> {
            Ok(self.entries.lock().unwrap().get(&queue_id.to_string()).cloned())
        }
        async fn list_restorable(&self, session_id: &SessionId) -> Result<Vec<QueueEntry>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .values()
                .filter(|e| &e.session_id == session_id && !e.status.is_terminal())
                .cloned()
                .collect())
        }
        async fn list_all_restorable(&self) -> Result<Vec<QueueEntry>> {
            Ok(self.entries.lock().unwrap().values().filter(|e| !e.status.is_terminal()).cloned().collect())
        }
    }

    #[derive(Default)]
    struct InMemoryLog {
        entries: Mutex<Vec<ExecutionLogEntry>>,
    }

    #[async_trait]
    impl ExecutionLogStore for InMemoryLog {
        async fn append(&self, entry: &ExecutionLogEntry) -> Result<()> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
        async fn update(&self, entry: &ExecutionLogEntry) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            if let Some(existing) = entries.iter_mut().find(|e| e.execution_id == entry.execution_id) {
                *existing = entry.clone();
            }
            Ok(())
        }
        async fn find_completed_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<ExecutionLogEntry>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .find(|e| &e.idempotency_key == key && e.status == ExecutionStatus::Completed)
                .cloned())
        }
        async fn find_completed_for_action(&self, session_id: &SessionId, action_id: &ActionId) -> Result<bool> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .any(|e| &e.session_id == session_id && &e.action_id == action_id && e.status == ExecutionStatus::Completed))
        }
        async fn get(&self, execution_id: &ExecutionId) -> Result<Option<ExecutionLogEntry>> {
            Ok(self.entries.lock().unwrap().iter().find(|e| &e.execution_id == execution_id).cloned())
        }
    }

    #[derive(Default)]
    struct InMemoryDlq {
        entries: Mutex<Vec<DlqEntry>>,
    }

    #[async_trait]
    impl DlqStore for InMemoryDlq {
        async fn insert(&self, entry: &DlqEntry) -> Result<()> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
        async fn list_unresolved(&self) -> Result<Vec<DlqEntry>> {
            Ok(self.entries.lock().unwrap().iter().filter(|e| !e.resolved).cloned().collect())
        }
        async fn get(&self, dlq_id: &DlqId) -> Result<Option<DlqEntry>> {
            Ok(self.entries.lock().unwrap().iter().find(|e| &e.dlq_id == dlq_id).cloned())
        }
        async fn update(&self, entry: &DlqEntry) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            if let Some(existing) = entries.iter_mut().find(|e| e.dlq_id == entry.dlq_id) {
                *existing = entry.clone();
            }
            Ok(())
        }
    }

    struct AlwaysFailsClient;
    #[async_trait]
    impl ActionExecutorClient for AlwaysFailsClient {
        async fn execute(&self, _action: &ActionDefinition, _params: &HashMap<String, String>) -> Result<serde_json::Value> {
            Err(BrainError::ExternalPermanent("brand rejected the request".to_string()))
        }
    }

    struct NoopEscalation;
    #[async_trait]
    impl EscalationSink for NoopEscalation {
        async fn escalate(&self, dlq_id: &DlqId, _action_id: &ActionId, _final_error: &str) -> Result<String> {
            Ok(format!("ESC-{dlq_id}"))
        }
    }

    struct NoSchemas;
    #[async_trait]
    impl SchemaRegistryStore for NoSchemas {
        async fn get_schema(&self, _brand_id: &BrandId, _schema_id: &SchemaId) -> Result<Option<SchemaDefinition>> {
            Ok(None)
        }
        async fn reload(&self, _brand_id: &BrandId) -> Result<()> {
            Ok(())
        }
    }

    struct NoFetch;
    #[async_trait]
    impl SchemaFetcher for NoFetch {
        async fn fetch(&self, _schema: &SchemaDefinition) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    struct NoWorkflows;
    #[async_trait]
    impl WorkflowRegistryStore for NoWorkflows {
        async fn get_workflow(&self, _workflow_id: &WorkflowId) -> Result<Option<WorkflowDefinition>> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct NoWorkflowInstances;
    #[async_trait]
    impl WorkflowInstanceStore for NoWorkflowInstances {
        async fn insert(&self, _instance: &WorkflowInstance) -> Result<()> {
            Ok(())
        }
        async fn update(&self, _instance: &WorkflowInstance) -> Result<()> {
            Ok(())
        }
        async fn get(&self, _workflow_instance_id: &WorkflowInstanceId) -> Result<Option<WorkflowInstance>> {
            Ok(None)
        }
        async fn list_in_progress(&self) -> Result<Vec<WorkflowInstance>> {
            Ok(Vec::new())
        }
    }

    fn test_action() -> ActionDefinition {
        ActionDefinition {
            instance_id: InstanceId::from("inst"),
            action_id: ActionId::from("cancel_subscription"),
            canonical_name: "cancel_subscription".to_string(),
            synonyms: HashSet::new(),
            params_required: vec![],
            params_optional: vec![],
            param_validation: HashMap::<String, ParamValidation>::new(),
            eligibility: Eligibility::default(),
            retry_policy: RetryPolicy::default(),
            timeout_ms: 5_000,
            workflow_id: None,
            sequence_id: None,
            triggers_workflow: false,
            priority: Priority::Normal,
            rollback_action_id: None,
            requires_user_ack: false,
            critical: true,
            is_active: true,
            api_endpoint: "https://example.test/cancel".to_string(),
            api_method: "POST".to_string(),
            success_criteria: "status_code == 200".to_string(),
            failure_criteria: None,
        }
    }

    #[tokio::test]
    async fn permanent_error_on_critical_action_escalates_to_dlq() {
        let queue_store: Arc<dyn QueueStore> = Arc::new(InMemoryQueue::default());
        let execution_log: Arc<dyn ExecutionLogStore> = Arc::new(InMemoryLog::default());
        let dlq_store: Arc<dyn DlqStore> = Arc::new(InMemoryDlq::default());
        let client: Arc<dyn ActionExecutorClient> = Arc::new(AlwaysFailsClient);
        let escalation: Arc<dyn EscalationSink> = Arc::new(NoopEscalation);
        let streaming = Arc::new(StreamingBus::new());
        let schemas: Arc<dyn SchemaRegistryStore> = Arc::new(NoSchemas);
        let schema_cache = Arc::new(SchemaStateCache::new(Arc::new(NoFetch)));
        let workflow_instances: Arc<dyn WorkflowInstanceStore> = Arc::new(NoWorkflowInstances::default());
        let workflow_engine = Arc::new(WorkflowEngine::new(Arc::new(NoWorkflows), workflow_instances.clone(), queue_store.clone()));

        let executor = QueueExecutor::new(
            queue_store.clone(),
            execution_log,
            dlq_store.clone(),
            client,
            escalation,
            streaming,
            BrandId::from("brand"),
            schemas,
            schema_cache,
            workflow_instances,
            workflow_engine,
        );

        let session = SessionId::from("s1");
        let action = test_action();
        let mut entry = QueueEntry::new(
            session.clone(),
            action.action_id.clone(),
            IdempotencyKey::compute(&session, &action.action_id, "{}"),
            HashMap::new(),
            Priority::Normal,
            3,
            false,
            None,
            "standard".to_string(),
            true,
        );
        entry.checkpoint(QueueStatus::Ready);
        queue_store.insert(&entry).await.unwrap();

        let resolve_action = |_: &ActionId| None;
        let outcome = executor.process_entry(&mut entry, &action, &resolve_action).await.unwrap();
        match outcome {
            ProcessOutcome::DeadLettered { dlq_id } => {
                let dlq_entries = dlq_store.list_unresolved().await.unwrap();
                assert_eq!(dlq_entries.len(), 1);
                assert_eq!(dlq_entries[0].dlq_id, dlq_id);
                assert!(dlq_entries[0].escalation_ticket_id.is_some());
            }
            other => panic!("expected DeadLettered, got {other:?}"),
        }
    }
}
