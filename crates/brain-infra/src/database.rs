//! SQLite-backed persistence for every durable collection named in §6:
//! Intent Ledger, Action Queue, Execution Log, Dead-Letter Store,
//! Workflow Instance, and Session Wires. Each table stores its entity
//! as a JSON blob alongside the indexed columns the spec requires
//! uniqueness or lookup on; `sqlx` gives us row-level uniqueness and
//! atomic single-row updates, which is all the spec asks for.

use async_trait::async_trait;
use brain_core::{
    ActionDefinition, ActionRegistryStore, DlqEntry, DlqStore, ExecutionLogEntry, ExecutionLogStore,
    IntentLedgerEntry, IntentLedgerStore, QueueEntry, QueueStore, SchemaDefinition,
    SchemaRegistryStore, SessionWires, WireStore, WorkflowDefinition, WorkflowInstance,
    WorkflowInstanceStore, WorkflowRegistryStore,
};
use brain_types::{
    ActionId, BrainError, BrandId, DlqId, ExecutionId, IdempotencyKey, InstanceId, IntentId,
    QueueId, Result, SchemaId, SessionId, WorkflowId, WorkflowInstanceId,
};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

/// Owns the connection pool and schema migration; individual stores
/// below borrow it.
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| BrainError::Database(format!("failed to connect to database: {e}")))?;
        Ok(Self { pool })
    }

    pub async fn new_in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    pub async fn new_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let database_url = format!("sqlite:{}", path.as_ref().display());
        Self::new(&database_url).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS intent_ledger (
                intent_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                turn_number INTEGER NOT NULL,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BrainError::Database(format!("failed to create intent_ledger table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS action_queue (
                queue_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                idempotency_key TEXT NOT NULL,
                status TEXT NOT NULL,
                is_terminal INTEGER NOT NULL,
                added_at TEXT NOT NULL,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BrainError::Database(format!("failed to create action_queue table: {e}")))?;

        // I2: at most one non-terminal queue entry per idempotency key.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_action_queue_idempotency_nonterminal
            ON action_queue (idempotency_key)
            WHERE is_terminal = 0
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BrainError::Database(format!("failed to create idempotency index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS execution_log (
                execution_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                idempotency_key TEXT NOT NULL,
                status TEXT NOT NULL,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BrainError::Database(format!("failed to create execution_log table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dead_letter_store (
                dlq_id TEXT PRIMARY KEY,
                resolved INTEGER NOT NULL,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BrainError::Database(format!("failed to create dead_letter_store table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_instance (
                workflow_instance_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BrainError::Database(format!("failed to create workflow_instance table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_wires (
                session_id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BrainError::Database(format!("failed to create session_wires table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS action_definitions (
                instance_id TEXT NOT NULL,
                action_id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (instance_id, action_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BrainError::Database(format!("failed to create action_definitions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_definitions (
                brand_id TEXT NOT NULL,
                schema_id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (brand_id, schema_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BrainError::Database(format!("failed to create schema_definitions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_definitions (
                workflow_id TEXT PRIMARY KEY,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BrainError::Database(format!("failed to create workflow_definitions table: {e}")))?;

        Ok(())
    }

    pub async fn health_check(&self) -> Result<bool> {
        let row = sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BrainError::Database(format!("health check failed: {e}")))?;
        let value: i32 = row.get(0);
        Ok(value == 1)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

pub struct SqliteIntentLedgerStore {
    pool: SqlitePool,
}

impl SqliteIntentLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntentLedgerStore for SqliteIntentLedgerStore {
    async fn insert(&self, entry: &IntentLedgerEntry) -> Result<()> {
        let data = serde_json::to_string(entry)?;
        sqlx::query(
            "INSERT INTO intent_ledger (intent_id, session_id, turn_number, data) VALUES (?, ?, ?, ?)",
        )
        .bind(entry.intent_id.to_string())
        .bind(entry.session_id.as_str())
        .bind(entry.turn_number as i64)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, entry: &IntentLedgerEntry) -> Result<()> {
        let data = serde_json::to_string(entry)?;
        sqlx::query("UPDATE intent_ledger SET data = ? WHERE intent_id = ?")
            .bind(data)
            .bind(entry.intent_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, intent_id: &IntentId) -> Result<Option<IntentLedgerEntry>> {
        let row = sqlx::query("SELECT data FROM intent_ledger WHERE intent_id = ?")
            .bind(intent_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| -> Result<IntentLedgerEntry> {
            let data: String = r.get(0);
            Ok(serde_json::from_str(&data)?)
        })
        .transpose()
    }

    async fn recent_for_session(&self, session_id: &SessionId, limit: usize) -> Result<Vec<IntentLedgerEntry>> {
        let rows = sqlx::query(
            "SELECT data FROM intent_ledger WHERE session_id = ? ORDER BY turn_number DESC LIMIT ?",
        )
        .bind(session_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| -> Result<IntentLedgerEntry> {
                let data: String = r.get(0);
                Ok(serde_json::from_str(&data)?)
            })
            .collect()
    }
}

pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, entry: &QueueEntry) -> Result<()> {
        let data = serde_json::to_string(entry)?;
        let is_terminal = entry.status.is_terminal() as i64;
        sqlx::query(
            r#"
            INSERT INTO action_queue (queue_id, session_id, idempotency_key, status, is_terminal, added_at, data)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(queue_id) DO UPDATE SET
                status = excluded.status,
                is_terminal = excluded.is_terminal,
                data = excluded.data
            "#,
        )
        .bind(entry.queue_id.to_string())
        .bind(entry.session_id.as_str())
        .bind(entry.idempotency_key.as_str())
        .bind(format!("{:?}", entry.status))
        .bind(is_terminal)
        .bind(entry.added_at.to_rfc3339())
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE") => {
                BrainError::Conflict(format!("idempotency key collision: {}", entry.idempotency_key))
            }
            _ => BrainError::from(e),
        })?;
        Ok(())
    }

    fn row_to_entry(data: String) -> Result<QueueEntry> {
        Ok(serde_json::from_str(&data)?)
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn insert(&self, entry: &QueueEntry) -> Result<()> {
        self.upsert(entry).await
    }

    async fn checkpoint(&self, entry: &QueueEntry) -> Result<()> {
        self.upsert(entry).await
    }

    async fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<QueueEntry>> {
        let row = sqlx::query(
            "SELECT data FROM action_queue WHERE idempotency_key = ? AND is_terminal = 0",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_entry(r.get(0))).transpose()
    }

    async fn get(&self, queue_id: &QueueId) -> Result<Option<QueueEntry>> {
        let row = sqlx::query("SELECT data FROM action_queue WHERE queue_id = ?")
            .bind(queue_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_entry(r.get(0))).transpose()
    }

    async fn list_restorable(&self, session_id: &SessionId) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query("SELECT data FROM action_queue WHERE session_id = ? AND is_terminal = 0")
            .bind(session_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| Self::row_to_entry(r.get(0))).collect()
    }

    async fn list_all_restorable(&self) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query("SELECT data FROM action_queue WHERE is_terminal = 0")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| Self::row_to_entry(r.get(0))).collect()
    }
}

pub struct SqliteExecutionLogStore {
    pool: SqlitePool,
}

impl SqliteExecutionLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(data: String) -> Result<ExecutionLogEntry> {
        Ok(serde_json::from_str(&data)?)
    }
}

#[async_trait]
impl ExecutionLogStore for SqliteExecutionLogStore {
    async fn append(&self, entry: &ExecutionLogEntry) -> Result<()> {
        let data = serde_json::to_string(entry)?;
        sqlx::query(
            "INSERT INTO execution_log (execution_id, session_id, idempotency_key, status, data) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.execution_id.to_string())
        .bind(entry.session_id.as_str())
        .bind(entry.idempotency_key.as_str())
        .bind(format!("{:?}", entry.status))
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, entry: &ExecutionLogEntry) -> Result<()> {
        let data = serde_json::to_string(entry)?;
        sqlx::query("UPDATE execution_log SET status = ?, data = ? WHERE execution_id = ?")
            .bind(format!("{:?}", entry.status))
            .bind(data)
            .bind(entry.execution_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_completed_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<ExecutionLogEntry>> {
        let row = sqlx::query(
            "SELECT data FROM execution_log WHERE idempotency_key = ? AND status = 'Completed' LIMIT 1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| Self::row_to_entry(r.get(0))).transpose()
    }

    async fn find_completed_for_action(&self, session_id: &SessionId, action_id: &ActionId) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM execution_log WHERE session_id = ? AND status = 'Completed' AND data LIKE ?",
        )
        .bind(session_id.as_str())
        .bind(format!("%\"action_id\":\"{}\"%", action_id.as_str()))
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get(0);
        Ok(count > 0)
    }

    async fn get(&self, execution_id: &ExecutionId) -> Result<Option<ExecutionLogEntry>> {
        let row = sqlx::query("SELECT data FROM execution_log WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_entry(r.get(0))).transpose()
    }
}

pub struct SqliteDlqStore {
    pool: SqlitePool,
}

impl SqliteDlqStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(data: String) -> Result<DlqEntry> {
        Ok(serde_json::from_str(&data)?)
    }
}

#[async_trait]
impl DlqStore for SqliteDlqStore {
    async fn insert(&self, entry: &DlqEntry) -> Result<()> {
        let data = serde_json::to_string(entry)?;
        sqlx::query("INSERT INTO dead_letter_store (dlq_id, resolved, data) VALUES (?, ?, ?)")
            .bind(entry.dlq_id.to_string())
            .bind(entry.resolved as i64)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_unresolved(&self) -> Result<Vec<DlqEntry>> {
        let rows = sqlx::query("SELECT data FROM dead_letter_store WHERE resolved = 0")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| Self::row_to_entry(r.get(0))).collect()
    }

    async fn get(&self, dlq_id: &DlqId) -> Result<Option<DlqEntry>> {
        let row = sqlx::query("SELECT data FROM dead_letter_store WHERE dlq_id = ?")
            .bind(dlq_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_entry(r.get(0))).transpose()
    }

    async fn update(&self, entry: &DlqEntry) -> Result<()> {
        let data = serde_json::to_string(entry)?;
        sqlx::query("UPDATE dead_letter_store SET resolved = ?, data = ? WHERE dlq_id = ?")
            .bind(entry.resolved as i64)
            .bind(data)
            .bind(entry.dlq_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct SqliteWorkflowInstanceStore {
    pool: SqlitePool,
}

impl SqliteWorkflowInstanceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_instance(data: String) -> Result<WorkflowInstance> {
        Ok(serde_json::from_str(&data)?)
    }
}

#[async_trait]
impl WorkflowInstanceStore for SqliteWorkflowInstanceStore {
    async fn insert(&self, instance: &WorkflowInstance) -> Result<()> {
        let data = serde_json::to_string(instance)?;
        sqlx::query("INSERT INTO workflow_instance (workflow_instance_id, status, data) VALUES (?, ?, ?)")
            .bind(instance.workflow_instance_id.to_string())
            .bind(format!("{:?}", instance.status))
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update(&self, instance: &WorkflowInstance) -> Result<()> {
        let data = serde_json::to_string(instance)?;
        sqlx::query("UPDATE workflow_instance SET status = ?, data = ? WHERE workflow_instance_id = ?")
            .bind(format!("{:?}", instance.status))
            .bind(data)
            .bind(instance.workflow_instance_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, workflow_instance_id: &WorkflowInstanceId) -> Result<Option<WorkflowInstance>> {
        let row = sqlx::query("SELECT data FROM workflow_instance WHERE workflow_instance_id = ?")
            .bind(workflow_instance_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| Self::row_to_instance(r.get(0))).transpose()
    }

    async fn list_in_progress(&self) -> Result<Vec<WorkflowInstance>> {
        let rows = sqlx::query("SELECT data FROM workflow_instance WHERE status = 'InProgress'")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| Self::row_to_instance(r.get(0))).collect()
    }
}

pub struct SqliteWireStore {
    pool: SqlitePool,
}

impl SqliteWireStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WireStore for SqliteWireStore {
    async fn load(&self, session_id: &SessionId) -> Result<Option<SessionWires>> {
        let row = sqlx::query("SELECT data FROM session_wires WHERE session_id = ?")
            .bind(session_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| -> Result<SessionWires> {
            let data: String = r.get(0);
            Ok(serde_json::from_str(&data)?)
        })
        .transpose()
    }

    async fn save(&self, wires: &SessionWires) -> Result<()> {
        let data = serde_json::to_string(wires)?;
        sqlx::query(
            r#"
            INSERT INTO session_wires (session_id, data) VALUES (?, ?)
            ON CONFLICT(session_id) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(wires.session_id.as_str())
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Read-through cache over `action_definitions`, keyed by instance
/// (§4.3): `list_actions`/`get_action` serve from the in-memory
/// snapshot; `reload` swaps in a freshly-queried one atomically.
pub struct SqliteActionRegistryStore {
    pool: SqlitePool,
    snapshot: RwLock<HashMap<InstanceId, Vec<ActionDefinition>>>,
}

impl SqliteActionRegistryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            snapshot: RwLock::new(HashMap::new()),
        }
    }

    pub async fn put(&self, action: &ActionDefinition) -> Result<()> {
        let data = serde_json::to_string(action)?;
        sqlx::query(
            r#"
            INSERT INTO action_definitions (instance_id, action_id, data) VALUES (?, ?, ?)
            ON CONFLICT(instance_id, action_id) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(action.instance_id.as_str())
        .bind(action.action_id.as_str())
        .bind(data)
        .execute(&self.pool)
        .await?;
        self.reload(&action.instance_id).await
    }
}

#[async_trait]
impl ActionRegistryStore for SqliteActionRegistryStore {
    async fn list_actions(&self, instance_id: &InstanceId) -> Result<Vec<ActionDefinition>> {
        let cached = self
            .snapshot
            .read()
            .map_err(|_| BrainError::Lock("action registry snapshot poisoned".to_string()))?
            .get(instance_id)
            .cloned();
        match cached {
            Some(actions) => Ok(actions),
            None => {
                self.reload(instance_id).await?;
                Ok(self
                    .snapshot
                    .read()
                    .map_err(|_| BrainError::Lock("action registry snapshot poisoned".to_string()))?
                    .get(instance_id)
                    .cloned()
                    .unwrap_or_default())
            }
        }
    }

    async fn get_action(&self, instance_id: &InstanceId, action_id: &ActionId) -> Result<Option<ActionDefinition>> {
        let actions = self.list_actions(instance_id).await?;
        Ok(actions.into_iter().find(|a| &a.action_id == action_id))
    }

    async fn reload(&self, instance_id: &InstanceId) -> Result<()> {
        let rows = sqlx::query("SELECT data FROM action_definitions WHERE instance_id = ?")
            .bind(instance_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        let actions = rows
            .into_iter()
            .map(|r| -> Result<ActionDefinition> {
                let data: String = r.get(0);
                Ok(serde_json::from_str(&data)?)
            })
            .collect::<Result<Vec<_>>>()?;
        self.snapshot
            .write()
            .map_err(|_| BrainError::Lock("action registry snapshot poisoned".to_string()))?
            .insert(instance_id.clone(), actions);
        Ok(())
    }
}

/// Read-through cache over `schema_definitions`, keyed by brand (§3).
pub struct SqliteSchemaRegistryStore {
    pool: SqlitePool,
    snapshot: RwLock<HashMap<BrandId, HashMap<SchemaId, SchemaDefinition>>>,
}

impl SqliteSchemaRegistryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            snapshot: RwLock::new(HashMap::new()),
        }
    }

    pub async fn put(&self, schema: &SchemaDefinition) -> Result<()> {
        let data = serde_json::to_string(schema)?;
        sqlx::query(
            r#"
            INSERT INTO schema_definitions (brand_id, schema_id, data) VALUES (?, ?, ?)
            ON CONFLICT(brand_id, schema_id) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(schema.brand_id.as_str())
        .bind(schema.schema_id.as_str())
        .bind(data)
        .execute(&self.pool)
        .await?;
        self.reload(&schema.brand_id).await
    }
}

#[async_trait]
impl SchemaRegistryStore for SqliteSchemaRegistryStore {
    async fn get_schema(&self, brand_id: &BrandId, schema_id: &SchemaId) -> Result<Option<SchemaDefinition>> {
        let cached = self
            .snapshot
            .read()
            .map_err(|_| BrainError::Lock("schema registry snapshot poisoned".to_string()))?
            .get(brand_id)
            .and_then(|m| m.get(schema_id))
            .cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        self.reload(brand_id).await?;
        Ok(self
            .snapshot
            .read()
            .map_err(|_| BrainError::Lock("schema registry snapshot poisoned".to_string()))?
            .get(brand_id)
            .and_then(|m| m.get(schema_id))
            .cloned())
    }

    async fn reload(&self, brand_id: &BrandId) -> Result<()> {
        let rows = sqlx::query("SELECT data FROM schema_definitions WHERE brand_id = ?")
            .bind(brand_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        let mut by_schema = HashMap::new();
        for row in rows {
            let data: String = row.get(0);
            let schema: SchemaDefinition = serde_json::from_str(&data)?;
            by_schema.insert(schema.schema_id.clone(), schema);
        }
        self.snapshot
            .write()
            .map_err(|_| BrainError::Lock("schema registry snapshot poisoned".to_string()))?
            .insert(brand_id.clone(), by_schema);
        Ok(())
    }
}

/// Workflow definitions change rarely enough that a reload-on-miss
/// cache (no explicit `reload` entry point on the trait) is sufficient.
pub struct SqliteWorkflowRegistryStore {
    pool: SqlitePool,
    snapshot: RwLock<HashMap<WorkflowId, WorkflowDefinition>>,
}

impl SqliteWorkflowRegistryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            snapshot: RwLock::new(HashMap::new()),
        }
    }

    pub async fn put(&self, workflow: &WorkflowDefinition) -> Result<()> {
        let data = serde_json::to_string(workflow)?;
        sqlx::query(
            r#"
            INSERT INTO workflow_definitions (workflow_id, data) VALUES (?, ?)
            ON CONFLICT(workflow_id) DO UPDATE SET data = excluded.data
            "#,
        )
        .bind(workflow.workflow_id.as_str())
        .bind(data)
        .execute(&self.pool)
        .await?;
        self.snapshot
            .write()
            .map_err(|_| BrainError::Lock("workflow registry snapshot poisoned".to_string()))?
            .insert(workflow.workflow_id.clone(), workflow.clone());
        Ok(())
    }
}

#[async_trait]
impl WorkflowRegistryStore for SqliteWorkflowRegistryStore {
    async fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowDefinition>> {
        let cached = self
            .snapshot
            .read()
            .map_err(|_| BrainError::Lock("workflow registry snapshot poisoned".to_string()))?
            .get(workflow_id)
            .cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        let row = sqlx::query("SELECT data FROM workflow_definitions WHERE workflow_id = ?")
            .bind(workflow_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let data: String = row.get(0);
        let workflow: WorkflowDefinition = serde_json::from_str(&data)?;
        self.snapshot
            .write()
            .map_err(|_| BrainError::Lock("workflow registry snapshot poisoned".to_string()))?
            .insert(workflow_id.clone(), workflow.clone());
        Ok(Some(workflow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_core::{IntentType, MatchType};
    use std::collections::HashMap;

    async fn manager() -> DatabaseManager {
        let manager = DatabaseManager::new_in_memory().await.unwrap();
        manager.initialize_schema().await.unwrap();
        manager
    }

    #[tokio::test]
    async fn health_check_succeeds_against_fresh_pool() {
        let manager = manager().await;
        assert!(manager.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn intent_ledger_round_trips() {
        let manager = manager().await;
        let store = SqliteIntentLedgerStore::new(manager.pool().clone());
        let entry = IntentLedgerEntry::new(
            SessionId::from("s1"),
            1,
            IntentType::Action,
            "apply_job".to_string(),
            MatchType::Exact,
            0.9,
            HashMap::new(),
        );
        store.insert(&entry).await.unwrap();
        let fetched = store.get(&entry.intent_id).await.unwrap().unwrap();
        assert_eq!(fetched.canonical_intent, "apply_job");
        let recent = store.recent_for_session(&entry.session_id, 5).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn queue_rejects_duplicate_nonterminal_idempotency_key() {
        use brain_core::Priority;
        let manager = manager().await;
        let store = SqliteQueueStore::new(manager.pool().clone());
        let key = IdempotencyKey("dup".to_string());
        let a = QueueEntry::new(
            SessionId::from("s1"),
            ActionId::from("apply_job"),
            key.clone(),
            HashMap::new(),
            Priority::Normal,
            3,
            false,
            None,
            "standard".to_string(),
            true,
        );
        let b = QueueEntry::new(
            SessionId::from("s1"),
            ActionId::from("apply_job"),
            key,
            HashMap::new(),
            Priority::Normal,
            3,
            false,
            None,
            "standard".to_string(),
            true,
        );
        store.insert(&a).await.unwrap();
        assert!(matches!(store.insert(&b).await, Err(BrainError::Conflict(_))));
    }
}
