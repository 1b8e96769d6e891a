//! Turn Pipeline (§4.1): the per-turn orchestration of intent
//! resolution, eligibility, enqueueing, workflow binding, and one
//! queue-processing pass, folded into a single Narrative and an
//! updated set of Session Wires. One `TurnPipeline` is scoped to a
//! single `(brand_id, instance_id)` — P8's tenant isolation is enforced
//! simply by never holding a second tenant's registry handle.

use brain_core::{
    ActionDefinition, ActiveTask, ActiveTaskSlot, ColdPathTrigger, IntentLedgerEntry, IntentStatus,
    IntentType, MatchType, Priority, QueueStatus,
};
use brain_core::{ActionRegistryStore, IntentLedgerStore, SchemaRegistryStore};
use brain_types::{ActionId, BrandId, IdempotencyKey, InstanceId, Result, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, warn};

use crate::eligibility::{EligibilityEvaluator, LogExecutionHistory, QueueInFlight, UserContext};
use crate::narrative::{Narrative, NarrativeBuilder};
use crate::queue_executor::QueueExecutor;
use crate::resolver;
use crate::schema_cache::SchemaStateCache;
use crate::session_lock::SessionLockRegistry;
use crate::streaming::StreamingBus;
use crate::wires::WireUpdater;
use crate::workflow::WorkflowEngine;
use brain_core::{ExecutionLogStore, QueueStore};
use brain_core::{QueueEntry, StreamingUpdateType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentInput {
    pub intent_type: IntentType,
    pub canonical_intent_candidates: Vec<String>,
    pub confidence: f64,
    pub entities: HashMap<String, String>,
    pub sequence: u64,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    pub session_id: SessionId,
    pub turn_number: u64,
    pub intents: Vec<IntentInput>,
}

#[derive(Debug, Serialize)]
pub struct TurnOutput {
    pub next_narrative: Narrative,
    pub wires: brain_core::SessionWires,
    pub streaming_head: Vec<brain_core::StreamingEvent>,
}

pub struct TurnPipeline {
    brand_id: BrandId,
    instance_id: InstanceId,
    actions: Arc<dyn ActionRegistryStore>,
    schemas: Arc<dyn SchemaRegistryStore>,
    ledger: Arc<dyn IntentLedgerStore>,
    schema_cache: Arc<SchemaStateCache>,
    queue: Arc<dyn QueueStore>,
    execution_log: Arc<dyn ExecutionLogStore>,
    executor: Arc<QueueExecutor>,
    workflow_engine: Arc<WorkflowEngine>,
    wire_updater: Arc<WireUpdater>,
    streaming: Arc<StreamingBus>,
    locks: Arc<SessionLockRegistry>,
    cold_path: Arc<dyn ColdPathTrigger>,
}

impl TurnPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        brand_id: BrandId,
        instance_id: InstanceId,
        actions: Arc<dyn ActionRegistryStore>,
        schemas: Arc<dyn SchemaRegistryStore>,
        ledger: Arc<dyn IntentLedgerStore>,
        schema_cache: Arc<SchemaStateCache>,
        queue: Arc<dyn QueueStore>,
        execution_log: Arc<dyn ExecutionLogStore>,
        executor: Arc<QueueExecutor>,
        workflow_engine: Arc<WorkflowEngine>,
        wire_updater: Arc<WireUpdater>,
        streaming: Arc<StreamingBus>,
        locks: Arc<SessionLockRegistry>,
        cold_path: Arc<dyn ColdPathTrigger>,
    ) -> Self {
        Self {
            brand_id,
            instance_id,
            actions,
            schemas,
            ledger,
            schema_cache,
            queue,
            execution_log,
            executor,
            workflow_engine,
            wire_updater,
            streaming,
            locks,
            cold_path,
        }
    }

    /// Runs a full turn: per-session serialized, per-intent isolated.
    pub async fn process_turn(&self, input: TurnInput, user: &UserContext, blocker_flags: &HashMap<String, bool>) -> Result<TurnOutput> {
        let _guard = self.locks.acquire(&input.session_id).await;

        let mut intents = input.intents;
        intents.sort_by_key(|i| i.sequence);

        let actions = self.actions.list_actions(&self.instance_id).await?;
        let mut wires = self.wire_updater.load_or_new(&input.session_id).await?;
        let mut last_narrative: Option<Narrative> = None;
        let mut active_task_slot = ActiveTaskSlot::default();
        if let Some(task) = wires.active_task.clone() {
            let _ = active_task_slot.install(task);
        }

        for intent in intents {
            match self.process_intent(&input.session_id, input.turn_number, intent, &actions, user, blocker_flags, &mut active_task_slot).await {
                Ok((narrative, summary)) => {
                    self.wire_updater.record_intent(&mut wires, summary);
                    last_narrative = Some(narrative);
                }
                Err(err) => {
                    error!(session_id = %input.session_id, error = %err, "intent processing failed, isolating to this intent");
                    last_narrative = Some(NarrativeBuilder::report_error(&err.to_string()));
                }
            }
        }

        let narrative = last_narrative.unwrap_or_else(|| NarrativeBuilder::report_completion(None));
        self.wire_updater.set_active_task(
            &mut wires,
            active_task_slot.get().cloned(),
            narrative.detection_context.answer_sheet.clone(),
        );
        self.wire_updater.save(&wires).await?;

        // §4.13: fire-and-forget, after wires are written. `conversation_ref`
        // points at this turn's slice of the ledger rather than embedding it,
        // since the trigger never reads its own result within this turn.
        let ledger_tail = self.ledger.recent_for_session(&input.session_id, 20).await.unwrap_or_default();
        let conversation_ref = format!("turn:{}:ledger_entries:{}", input.turn_number, ledger_tail.len());
        self.cold_path.trigger(&input.session_id, &conversation_ref).await;

        let streaming_head = self.streaming.latest(&input.session_id).await;
        Ok(TurnOutput {
            next_narrative: narrative,
            wires,
            streaming_head,
        })
    }

    /// Steps A-H of §4.1 for a single Brain-required intent. Self-
    /// response intent types never reach this pipeline; callers filter
    /// them out via `IntentType::bypasses_pipeline`.
    async fn process_intent(
        &self,
        session_id: &SessionId,
        turn_number: u64,
        intent: IntentInput,
        actions: &[ActionDefinition],
        user: &UserContext,
        blocker_flags: &HashMap<String, bool>,
        active_task_slot: &mut ActiveTaskSlot,
    ) -> Result<(Narrative, brain_core::IntentSummary)> {
        // A. Action Resolution.
        let (resolved, match_type) = if intent.intent_type == IntentType::Action {
            resolver::resolve(&intent.canonical_intent_candidates, actions)
        } else {
            (None, MatchType::NotFound)
        };

        let canonical_intent = resolved
            .map(|a| a.canonical_name.clone())
            .or_else(|| intent.canonical_intent_candidates.first().cloned())
            .unwrap_or_default();

        // B. Ledger Write.
        let mut ledger_entry = IntentLedgerEntry::new(
            session_id.clone(),
            turn_number,
            intent.intent_type,
            canonical_intent,
            match_type,
            intent.confidence,
            intent.entities.clone(),
        );
        self.ledger.insert(&ledger_entry).await?;
        self.streaming
            .emit(session_id, StreamingUpdateType::IntentLogged, serde_json::json!({ "intent_id": ledger_entry.intent_id.to_string() }))
            .await;

        let Some(action) = resolved else {
            ledger_entry.mark_action_not_found()?;
            self.ledger.update(&ledger_entry).await?;
            self.streaming.emit(session_id, StreamingUpdateType::ActionNotFound, serde_json::Value::Null).await;
            return Ok((NarrativeBuilder::report_error("action_not_found"), ledger_entry.summary()));
        };

        ledger_entry.transition(IntentStatus::Processing)?;
        self.ledger.update(&ledger_entry).await?;

        // C. Schema Fetch.
        self.streaming.emit(session_id, StreamingUpdateType::FetchingSchemas, serde_json::Value::Null).await;
        let mut schema_states = HashMap::new();
        let mut cache_hits = 0usize;
        for dep in &action.eligibility.schema_dependencies {
            if let Some(schema) = self.schemas.get_schema(&self.brand_id, &dep.schema_id).await? {
                let state = self.schema_cache.get(session_id, &schema, false).await?;
                schema_states.insert(dep.schema_id.as_str().to_string(), state);
                cache_hits += 1;
            }
        }
        self.streaming
            .emit(session_id, StreamingUpdateType::SchemasFetched, serde_json::json!({ "cache_hit": cache_hits }))
            .await;

        // D. Eligibility.
        self.streaming.emit(session_id, StreamingUpdateType::CheckingEligibility, serde_json::Value::Null).await;
        let history = LogExecutionHistory(self.execution_log.clone());
        let in_flight = QueueInFlight(self.queue.clone());
        let eligibility = EligibilityEvaluator::evaluate(session_id, &action, user, &schema_states, blocker_flags, &history, &in_flight).await?;
        self.streaming
            .emit(session_id, StreamingUpdateType::EligibilityChecked, serde_json::json!({ "eligible": eligibility.eligible }))
            .await;

        if !eligibility.eligible {
            ledger_entry.mark_blocked(eligibility.reasons.join(","))?;
            self.ledger.update(&ledger_entry).await?;
            self.streaming
                .emit(session_id, StreamingUpdateType::ActionBlocked, serde_json::json!({ "reasons": eligibility.reasons }))
                .await;
            let answer_sheet = NarrativeBuilder::answer_sheet_for_blocker(&eligibility.reasons, &action);
            return Ok((NarrativeBuilder::handle_blocker(&eligibility.reasons, answer_sheet), ledger_entry.summary()));
        }

        // E. Parameter Check.
        let collected_keys: HashSet<String> = intent.entities.keys().cloned().collect();
        let missing = action.missing_params(&collected_keys);
        if !missing.is_empty() {
            let task = ActiveTask::new(session_id.clone(), action.action_id.clone(), action.params_required.clone(), intent.entities.clone());
            active_task_slot.install(task)?;
            self.streaming
                .emit(session_id, StreamingUpdateType::CollectingParams, serde_json::json!({ "missing": missing }))
                .await;
            let first_missing = &missing[0];
            let validation = action.param_validation.get(first_missing);
            let narrative = match validation {
                Some(v) => NarrativeBuilder::ask_for_params(first_missing, v),
                None => NarrativeBuilder::report_error("missing_param_validation_undefined"),
            };
            return Ok((narrative, ledger_entry.summary()));
        }

        // F. Enqueue.
        let mut canonical_params: Vec<(&String, &String)> = intent.entities.iter().collect();
        canonical_params.sort_by_key(|(k, _)| k.as_str());
        let canonical = serde_json::to_string(&canonical_params).unwrap_or_default();
        let idempotency_key = IdempotencyKey::compute(session_id, &action.action_id, &canonical);

        if let Some(prior) = self.execution_log.find_completed_by_idempotency_key(&idempotency_key).await? {
            ledger_entry.transition(IntentStatus::Queued)?;
            ledger_entry.transition(IntentStatus::Executing)?;
            ledger_entry.transition(IntentStatus::Completed)?;
            ledger_entry.resolution = Some("idempotent_replay".to_string());
            self.ledger.update(&ledger_entry).await?;
            return Ok((NarrativeBuilder::report_completion(prior.result), ledger_entry.summary()));
        }
        if let Some(existing) = self.queue.find_by_idempotency_key(&idempotency_key).await? {
            if !existing.status.is_terminal() {
                ledger_entry.transition(IntentStatus::Queued)?;
                self.ledger.update(&ledger_entry).await?;
                return Ok((NarrativeBuilder::report_progress(), ledger_entry.summary()));
            }
        }

        let mut entry = QueueEntry::new(
            session_id.clone(),
            action.action_id.clone(),
            idempotency_key,
            intent.entities.clone(),
            intent.priority,
            action.retry_policy.max_retries,
            false,
            None,
            user.tier.clone(),
            user.authenticated,
        );
        entry.checkpoint(QueueStatus::Ready);
        self.queue.insert(&entry).await?;
        ledger_entry.triggered_actions.push(action.action_id.clone());
        ledger_entry.transition(IntentStatus::Queued)?;
        self.ledger.update(&ledger_entry).await?;
        self.streaming
            .emit(session_id, StreamingUpdateType::ActionQueued, serde_json::json!({ "action_id": action.action_id.as_str() }))
            .await;

        let action_map: HashMap<String, ActionDefinition> = actions.iter().map(|a| (a.action_id.as_str().to_string(), a.clone())).collect();
        let resolve = |id: &ActionId| action_map.get(id.as_str()).cloned();

        // G. Workflow Binding.
        if action.triggers_workflow {
            if let Some(workflow_id) = &action.workflow_id {
                if let Err(err) = self.workflow_engine.instantiate(session_id, workflow_id, action.timeout_ms, user, resolve).await {
                    warn!(error = %err, "workflow instantiation failed");
                }
            }
        }

        // H. Execute Pass.
        let outcomes = self.executor.process_session(session_id, resolve).await?;
        let terminal_outcome = outcomes.iter().find(|(queue_id, _)| queue_id == &entry.queue_id);

        let narrative = match terminal_outcome {
            Some((_, crate::queue_executor::ProcessOutcome::Completed { result })) => {
                ledger_entry.transition(IntentStatus::Executing)?;
                ledger_entry.transition(IntentStatus::Completed)?;
                self.ledger.update(&ledger_entry).await?;
                NarrativeBuilder::report_completion(Some(result.clone()))
            }
            Some((_, crate::queue_executor::ProcessOutcome::DeadLettered { .. })) => {
                ledger_entry.mark_failed("action moved to dead-letter store".to_string())?;
                self.ledger.update(&ledger_entry).await?;
                NarrativeBuilder::report_error("action_failed")
            }
            Some((_, crate::queue_executor::ProcessOutcome::Retrying { .. })) | Some((_, crate::queue_executor::ProcessOutcome::Blocked)) | None => {
                NarrativeBuilder::report_progress()
            }
        };
        Ok((narrative, ledger_entry.summary()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use brain_core::{
        DlqEntry, Eligibility, ExecutionLogEntry, ExecutionStatus, ParamValidation, RetryPolicy,
        SchemaDefinition, SchemaFetcher, WorkflowDefinition, WorkflowInstance,
    };
    use brain_core::{ActionExecutorClient, DlqStore, EscalationSink, ExecutionLogStore, WireStore, WorkflowInstanceStore, WorkflowRegistryStore};
    use brain_types::{DlqId, ExecutionId, IntentId, QueueId, SchemaId, WorkflowId, WorkflowInstanceId};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeActions(Vec<ActionDefinition>);
    #[async_trait]
    impl ActionRegistryStore for FakeActions {
        async fn list_actions(&self, _instance_id: &InstanceId) -> Result<Vec<ActionDefinition>> {
            Ok(self.0.clone())
        }
        async fn get_action(&self, _instance_id: &InstanceId, action_id: &ActionId) -> Result<Option<ActionDefinition>> {
            Ok(self.0.iter().find(|a| &a.action_id == action_id).cloned())
        }
        async fn reload(&self, _instance_id: &InstanceId) -> Result<()> {
            Ok(())
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

    #[derive(Default)]
    struct FakeLedger(Mutex<Vec<IntentLedgerEntry>>);
    #[async_trait]
    impl IntentLedgerStore for FakeLedger {
        async fn insert(&self, entry: &IntentLedgerEntry) -> Result<()> {
            self.0.lock().unwrap().push(entry.clone());
            Ok(())
        }
        async fn update(&self, entry: &IntentLedgerEntry) -> Result<()> {
            let mut entries = self.0.lock().unwrap();
            if let Some(existing) = entries.iter_mut().find(|e| e.intent_id == entry.intent_id) {
                *existing = entry.clone();
            }
            Ok(())
        }
        async fn get(&self, intent_id: &IntentId) -> Result<Option<IntentLedgerEntry>> {
            Ok(self.0.lock().unwrap().iter().find(|e| &e.intent_id == intent_id).cloned())
        }
        async fn recent_for_session(&self, session_id: &SessionId, limit: usize) -> Result<Vec<IntentLedgerEntry>> {
            Ok(self.0.lock().unwrap().iter().filter(|e| &e.session_id == session_id).take(limit).cloned().collect())
        }
    }

    #[derive(Default)]
    struct FakeQueue(Mutex<Vec<QueueEntry>>);
    #[async_trait]
    impl QueueStore for FakeQueue {
        async fn insert(&self, entry: &QueueEntry) -> Result<()> {
            self.0.lock().unwrap().push(entry.clone());
            Ok(())
        }
        async fn checkpoint(&self, entry: &QueueEntry) -> Result<()> {
            let mut entries = self.0.lock().unwrap();
            if let Some(existing) = entries.iter_mut().find(|e| e.queue_id == entry.queue_id) {
                *existing = entry.clone();
            }
            Ok(())
        }
        async fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<QueueEntry>> {
            Ok(self.0.lock().unwrap().iter().find(|e| &e.idempotency_key == key).cloned())
        }
        async fn get(&self, queue_id: &QueueId) -> Result<Option<QueueEntry>> {
            Ok(self.0.lock().unwrap().iter().find(|e| &e.queue_id == queue_id).cloned())
        }
        async fn list_restorable(&self, session_id: &SessionId) -> Result<Vec<QueueEntry>> {
            Ok(self.0.lock().unwrap().iter().filter(|e| &e.session_id == session_id && !e.status.is_terminal()).cloned().collect())
        }
        async fn list_all_restorable(&self) -> Result<Vec<QueueEntry>> {
            Ok(self.0.lock().unwrap().iter().filter(|e| !e.status.is_terminal()).cloned().collect())
        }
    }

    #[derive(Default)]
    struct FakeExecutionLog(Mutex<Vec<ExecutionLogEntry>>);
    #[async_trait]
    impl ExecutionLogStore for FakeExecutionLog {
        async fn append(&self, entry: &ExecutionLogEntry) -> Result<()> {
            self.0.lock().unwrap().push(entry.clone());
            Ok(())
        }
        async fn update(&self, entry: &ExecutionLogEntry) -> Result<()> {
            let mut entries = self.0.lock().unwrap();
            if let Some(existing) = entries.iter_mut().find(|e| e.execution_id == entry.execution_id) {
                *existing = entry.clone();
            }
            Ok(())
        }
        async fn find_completed_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<ExecutionLogEntry>> {
            Ok(self.0.lock().unwrap().iter().find(|e| &e.idempotency_key == key && e.status == ExecutionStatus::Completed).cloned())
        }
        async fn find_completed_for_action(&self, session_id: &SessionId, action_id: &ActionId) -> Result<bool> {
            Ok(self.0.lock().unwrap().iter().any(|e| &e.session_id == session_id && &e.action_id == action_id && e.status == ExecutionStatus::Completed))
        }
        async fn get(&self, execution_id: &ExecutionId) -> Result<Option<ExecutionLogEntry>> {
            Ok(self.0.lock().unwrap().iter().find(|e| &e.execution_id == execution_id).cloned())
        }
    }

    #[derive(Default)]
    struct FakeDlq(Mutex<Vec<DlqEntry>>);
    #[async_trait]
    impl DlqStore for FakeDlq {
        async fn insert(&self, entry: &DlqEntry) -> Result<()> {
            self.0.lock().unwrap().push(entry.clone());
            Ok(())
        }
        async fn list_unresolved(&self) -> Result<Vec<DlqEntry>> {
            Ok(self.0.lock().unwrap().iter().filter(|e| !e.resolved).cloned().collect())
        }
        async fn get(&self, dlq_id: &DlqId) -> Result<Option<DlqEntry>> {
            Ok(self.0.lock().unwrap().iter().find(|e| &e.dlq_id == dlq_id).cloned())
        }
        async fn update(&self, entry: &DlqEntry) -> Result<()> {
            let mut entries = self.0.lock().unwrap();
            if let Some(existing) = entries.iter_mut().find(|e| e.dlq_id == entry.dlq_id) {
                *existing = entry.clone();
            }
            Ok(())
        }
    }

    struct SucceedingClient;
    #[async_trait]
    impl ActionExecutorClient for SucceedingClient {
        async fn execute(&self, _action: &ActionDefinition, _params: &HashMap<String, String>) -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "status": "ok" }))
        }
    }

    struct NoopColdPath;
    #[async_trait]
    impl ColdPathTrigger for NoopColdPath {
        async fn trigger(&self, _session_id: &SessionId, _conversation_ref: &str) {}
    }

    struct NoopEscalation;
    #[async_trait]
    impl EscalationSink for NoopEscalation {
        async fn escalate(&self, dlq_id: &DlqId, _action_id: &ActionId, _final_error: &str) -> Result<String> {
            Ok(format!("ESC-{dlq_id}"))
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

    #[derive(Default)]
    struct FakeWires(Mutex<HashMap<String, brain_core::SessionWires>>);
    #[async_trait]
    impl WireStore for FakeWires {
        async fn load(&self, session_id: &SessionId) -> Result<Option<brain_core::SessionWires>> {
            Ok(self.0.lock().unwrap().get(session_id.as_str()).cloned())
        }
        async fn save(&self, wires: &brain_core::SessionWires) -> Result<()> {
            self.0.lock().unwrap().insert(wires.session_id.as_str().to_string(), wires.clone());
            Ok(())
        }
    }

    fn apply_job_action() -> ActionDefinition {
        let mut param_validation = HashMap::new();
        param_validation.insert(
            "resume_url".to_string(),
            ParamValidation::Entity { format_regex: "^https?://".to_string() },
        );
        ActionDefinition {
            instance_id: InstanceId::from("inst"),
            action_id: ActionId::from("apply_job"),
            canonical_name: "apply_job".to_string(),
            synonyms: HashSet::new(),
            params_required: vec!["job_id".to_string(), "resume_url".to_string()],
            params_optional: vec![],
            param_validation,
            eligibility: Eligibility::default(),
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
            api_endpoint: "https://example.test/apply".to_string(),
            api_method: "POST".to_string(),
            success_criteria: "status_code == 200".to_string(),
            failure_criteria: None,
        }
    }

    #[tokio::test]
    async fn happy_path_action_completes_and_reports_completion() {
        let actions = Arc::new(FakeActions(vec![apply_job_action()]));
        let schemas: Arc<dyn SchemaRegistryStore> = Arc::new(NoSchemas);
        let ledger = Arc::new(FakeLedger::default());
        let schema_cache = Arc::new(SchemaStateCache::new(Arc::new(NoFetch)));
        let queue: Arc<dyn QueueStore> = Arc::new(FakeQueue::default());
        let execution_log: Arc<dyn ExecutionLogStore> = Arc::new(FakeExecutionLog::default());
        let dlq: Arc<dyn DlqStore> = Arc::new(FakeDlq::default());
        let client: Arc<dyn ActionExecutorClient> = Arc::new(SucceedingClient);
        let escalation: Arc<dyn EscalationSink> = Arc::new(NoopEscalation);
        let streaming = Arc::new(StreamingBus::new());
        let workflow_instances: Arc<dyn WorkflowInstanceStore> = Arc::new(NoWorkflowInstances::default());
        let workflow_engine = Arc::new(WorkflowEngine::new(Arc::new(NoWorkflows), workflow_instances.clone(), queue.clone()));
        let executor = Arc::new(QueueExecutor::new(
            queue.clone(),
            execution_log.clone(),
            dlq,
            client,
            escalation,
            streaming.clone(),
            BrandId::from("brand"),
            schemas.clone(),
            schema_cache.clone(),
            workflow_instances,
            workflow_engine.clone(),
        ));
        let wire_updater = Arc::new(WireUpdater::new(Arc::new(FakeWires::default())));
        let locks = Arc::new(SessionLockRegistry::new());
        let cold_path: Arc<dyn ColdPathTrigger> = Arc::new(NoopColdPath);

        let pipeline = TurnPipeline::new(
            BrandId::from("brand"),
            InstanceId::from("inst"),
            actions,
            schemas,
            ledger,
            schema_cache,
            queue,
            execution_log,
            executor,
            workflow_engine,
            wire_updater,
            streaming,
            locks,
            cold_path,
        );

        let mut entities = HashMap::new();
        entities.insert("job_id".to_string(), "12345".to_string());
        entities.insert("resume_url".to_string(), "https://example.test/resume.pdf".to_string());

        let input = TurnInput {
            session_id: SessionId::from("s1"),
            turn_number: 1,
            intents: vec![IntentInput {
                intent_type: IntentType::Action,
                canonical_intent_candidates: vec!["apply_job".to_string()],
                confidence: 0.95,
                entities,
                sequence: 0,
                priority: Priority::Normal,
            }],
        };
        let user = UserContext { tier: "standard".to_string(), authenticated: true };

        let output = pipeline.process_turn(input, &user, &HashMap::new()).await.unwrap();

        assert_eq!(output.next_narrative.generation_instruction.instruction_type, crate::narrative::InstructionType::ReportCompletion);
        assert!(!output.wires.expecting_response);
        assert_eq!(output.wires.previous_intents.back().unwrap().canonical_intent, "apply_job");
        assert_eq!(output.wires.previous_intents.back().unwrap().match_type, MatchType::Exact);
    }
}
