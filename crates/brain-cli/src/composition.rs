//! Wires together one tenant's `TurnPipeline` from SQLite-backed stores
//! and the brand HTTP client, for both `serve` and the one-shot
//! operator commands.

use brain_cognitive::{QueueExecutor, SchemaStateCache, SessionLockRegistry, StreamingBus, TurnPipeline, WireUpdater, WorkflowEngine};
use brain_core::ActionRegistryStore;
use brain_infra::{
    BrandApiClient, DatabaseManager, LoggingColdPathTrigger, LoggingEscalationSink, SqliteActionRegistryStore,
    SqliteDlqStore, SqliteExecutionLogStore, SqliteIntentLedgerStore, SqliteQueueStore, SqliteSchemaRegistryStore,
    SqliteWireStore, SqliteWorkflowInstanceStore, SqliteWorkflowRegistryStore,
};
use brain_types::{BrandId, InstanceId};
use std::sync::Arc;

pub async fn open_database(path: &str) -> anyhow::Result<DatabaseManager> {
    let db = DatabaseManager::new_file(path).await?;
    db.initialize_schema().await?;
    Ok(db)
}

/// Everything a tenant's pipeline needs plus the background-sweep
/// collaborators (`executor`/`workflow_engine`/`actions`) that
/// `Commands::Serve` polls on an interval for crash recovery and
/// workflow timeouts (§4.6, §4.8).
pub struct TenantRuntime {
    pub pipeline: Arc<TurnPipeline>,
    pub executor: Arc<QueueExecutor>,
    pub workflow_engine: Arc<WorkflowEngine>,
    pub actions: Arc<dyn ActionRegistryStore>,
    pub instance_id: InstanceId,
}

pub fn build_pipeline(db: &DatabaseManager, brand_id: BrandId, instance_id: InstanceId) -> TenantRuntime {
    let pool = db.pool().clone();
    let brand_client = Arc::new(BrandApiClient::new());

    let actions = Arc::new(SqliteActionRegistryStore::new(pool.clone()));
    let schemas = Arc::new(SqliteSchemaRegistryStore::new(pool.clone()));
    let ledger = Arc::new(SqliteIntentLedgerStore::new(pool.clone()));
    let queue = Arc::new(SqliteQueueStore::new(pool.clone()));
    let execution_log = Arc::new(SqliteExecutionLogStore::new(pool.clone()));
    let dlq = Arc::new(SqliteDlqStore::new(pool.clone()));
    let workflow_registry = Arc::new(SqliteWorkflowRegistryStore::new(pool.clone()));
    let workflow_instances = Arc::new(SqliteWorkflowInstanceStore::new(pool.clone()));
    let wires = Arc::new(SqliteWireStore::new(pool));

    let schema_cache = Arc::new(SchemaStateCache::new(brand_client.clone()));
    let streaming = Arc::new(StreamingBus::new());
    let workflow_engine = Arc::new(WorkflowEngine::new(workflow_registry, workflow_instances.clone(), queue.clone()));
    let executor = Arc::new(QueueExecutor::new(
        queue.clone(),
        execution_log.clone(),
        dlq,
        brand_client,
        Arc::new(LoggingEscalationSink::new()),
        streaming.clone(),
        brand_id.clone(),
        schemas.clone(),
        schema_cache.clone(),
        workflow_instances,
        workflow_engine.clone(),
    ));
    let wire_updater = Arc::new(WireUpdater::new(wires));
    let locks = Arc::new(SessionLockRegistry::new());
    let cold_path = Arc::new(LoggingColdPathTrigger::new());

    let pipeline = TurnPipeline::new(
        brand_id,
        instance_id.clone(),
        actions.clone(),
        schemas,
        ledger,
        schema_cache,
        queue,
        execution_log,
        executor.clone(),
        workflow_engine.clone(),
        wire_updater,
        streaming,
        locks,
        cold_path,
    );

    TenantRuntime {
        pipeline: Arc::new(pipeline),
        executor,
        workflow_engine,
        actions,
        instance_id,
    }
}

/// Runs crash-recovery and workflow-timeout sweeps on an interval until
/// the process exits (§4.6, §4.8). Intended to run as a background task
/// alongside `brain_api::serve`.
pub async fn run_sweeps(runtime: Arc<TenantRuntime>, period: std::time::Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        if let Err(err) = runtime.executor.recover_abandoned().await {
            tracing::warn!(%err, "crash-recovery sweep failed");
        }
        let actions = match runtime.actions.list_actions(&runtime.instance_id).await {
            Ok(actions) => actions,
            Err(err) => {
                tracing::warn!(%err, "could not load actions for workflow timeout sweep");
                continue;
            }
        };
        let lookup: std::collections::HashMap<_, _> =
            actions.into_iter().map(|a| (a.action_id.clone(), a)).collect();
        if let Err(err) = runtime
            .workflow_engine
            .sweep_timeouts(|action_id| lookup.get(action_id).cloned())
            .await
        {
            tracing::warn!(%err, "workflow timeout sweep failed");
        }
    }
}
