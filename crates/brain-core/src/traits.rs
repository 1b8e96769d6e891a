//! Storage and external-collaborator traits. `brain-core` defines the
//! seams; `brain-infra` implements them against SQLite and outbound
//! HTTP, and `brain-cognitive` depends only on these traits so it can be
//! tested against hand-rolled in-memory fakes.

use crate::action::ActionDefinition;
use crate::dlq::DlqEntry;
use crate::intent::IntentLedgerEntry;
use crate::queue::{ExecutionLogEntry, QueueEntry};
use crate::schema::SchemaDefinition;
use crate::wires::SessionWires;
use crate::workflow::{WorkflowDefinition, WorkflowInstance};
use async_trait::async_trait;
use brain_types::{
    ActionId, BrandId, DlqId, ExecutionId, IdempotencyKey, InstanceId, IntentId, QueueId, Result,
    SchemaId, SessionId, WorkflowId, WorkflowInstanceId,
};

/// Durable Intent Ledger persistence (§6), unique on `intent_id`.
#[async_trait]
pub trait IntentLedgerStore: Send + Sync {
    async fn insert(&self, entry: &IntentLedgerEntry) -> Result<()>;
    async fn update(&self, entry: &IntentLedgerEntry) -> Result<()>;
    async fn get(&self, intent_id: &IntentId) -> Result<Option<IntentLedgerEntry>>;
    async fn recent_for_session(&self, session_id: &SessionId, limit: usize) -> Result<Vec<IntentLedgerEntry>>;
}

/// Read-through cache of `(brand_id, instance_id) -> list<ActionDefinition>`
/// (§4.3). Implementations own the atomic snapshot-swap on reload.
#[async_trait]
pub trait ActionRegistryStore: Send + Sync {
    async fn list_actions(&self, instance_id: &InstanceId) -> Result<Vec<ActionDefinition>>;
    async fn get_action(&self, instance_id: &InstanceId, action_id: &ActionId) -> Result<Option<ActionDefinition>>;
    async fn reload(&self, instance_id: &InstanceId) -> Result<()>;
}

/// Per-brand schema definitions (§3, §4.3's sibling registry).
#[async_trait]
pub trait SchemaRegistryStore: Send + Sync {
    async fn get_schema(&self, brand_id: &BrandId, schema_id: &SchemaId) -> Result<Option<SchemaDefinition>>;
    async fn reload(&self, brand_id: &BrandId) -> Result<()>;
}

/// Per-workflow definitions, owned by the Registry layer like actions
/// and schemas.
#[async_trait]
pub trait WorkflowRegistryStore: Send + Sync {
    async fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowDefinition>>;
}

/// Durable Action Queue persistence (§6): unique on `queue_id` and on
/// `idempotency_key` among non-terminal entries (I2).
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn insert(&self, entry: &QueueEntry) -> Result<()>;
    async fn checkpoint(&self, entry: &QueueEntry) -> Result<()>;
    async fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<QueueEntry>>;
    async fn get(&self, queue_id: &QueueId) -> Result<Option<QueueEntry>>;
    /// All entries for a session in a restorable status, used both for
    /// a processing pass and for crash recovery (§4.6).
    async fn list_restorable(&self, session_id: &SessionId) -> Result<Vec<QueueEntry>>;
    async fn list_all_restorable(&self) -> Result<Vec<QueueEntry>>;
}

/// Append-only Execution Log (§6).
#[async_trait]
pub trait ExecutionLogStore: Send + Sync {
    async fn append(&self, entry: &ExecutionLogEntry) -> Result<()>;
    async fn update(&self, entry: &ExecutionLogEntry) -> Result<()>;
    async fn find_completed_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<ExecutionLogEntry>>;
    async fn find_completed_for_action(&self, session_id: &SessionId, action_id: &ActionId) -> Result<bool>;
    async fn get(&self, execution_id: &ExecutionId) -> Result<Option<ExecutionLogEntry>>;
}

/// Dead-Letter Store (§4.9): write-only from the Executor, read/update
/// externally for manual intervention.
#[async_trait]
pub trait DlqStore: Send + Sync {
    async fn insert(&self, entry: &DlqEntry) -> Result<()>;
    async fn list_unresolved(&self) -> Result<Vec<DlqEntry>>;
    async fn get(&self, dlq_id: &DlqId) -> Result<Option<DlqEntry>>;
    async fn update(&self, entry: &DlqEntry) -> Result<()>;
}

/// Workflow Instance persistence (§6).
#[async_trait]
pub trait WorkflowInstanceStore: Send + Sync {
    async fn insert(&self, instance: &WorkflowInstance) -> Result<()>;
    async fn update(&self, instance: &WorkflowInstance) -> Result<()>;
    async fn get(&self, workflow_instance_id: &WorkflowInstanceId) -> Result<Option<WorkflowInstance>>;
    async fn list_in_progress(&self) -> Result<Vec<WorkflowInstance>>;
}

/// Session Wires persistence (§6), written atomically with the turn's
/// checkpoint.
#[async_trait]
pub trait WireStore: Send + Sync {
    async fn load(&self, session_id: &SessionId) -> Result<Option<SessionWires>>;
    async fn save(&self, wires: &SessionWires) -> Result<()>;
}

/// Outbound Brand Schema API client (§6, §4.4). Returns the raw JSON
/// body; callers derive key statuses from it.
#[async_trait]
pub trait SchemaFetcher: Send + Sync {
    async fn fetch(&self, schema: &SchemaDefinition) -> Result<serde_json::Value>;
}

/// Outbound Brand Action API client (§6, §4.6).
#[async_trait]
pub trait ActionExecutorClient: Send + Sync {
    async fn execute(
        &self,
        action: &ActionDefinition,
        params: &std::collections::HashMap<String, String>,
    ) -> Result<serde_json::Value>;
}

/// Pluggable escalation sink for DLQ entries flagged critical (§4.6
/// step 5, SPEC_FULL §C): the ticketing call itself is external, only
/// the reference is stored.
#[async_trait]
pub trait EscalationSink: Send + Sync {
    async fn escalate(&self, dlq_id: &DlqId, action_id: &ActionId, final_error: &str) -> Result<String>;
}

/// Cold-path trigger contract (§4.13): fire-and-forget, the Brain never
/// reads its output within the same turn.
#[async_trait]
pub trait ColdPathTrigger: Send + Sync {
    async fn trigger(&self, session_id: &SessionId, conversation_ref: &str);
}
