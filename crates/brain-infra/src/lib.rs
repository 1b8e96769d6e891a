//! Brain Infrastructure Layer
//!
//! Concrete implementations of the storage and collaborator traits
//! declared in `brain-core::traits`: SQLite-backed persistence for
//! every durable collection, and outbound HTTP for brand schema/action
//! APIs, escalation, and the cold-path trigger.

pub mod brand_api;
pub mod cold_path;
pub mod database;
pub mod escalation;

pub use brand_api::BrandApiClient;
pub use cold_path::LoggingColdPathTrigger;
pub use database::{
    DatabaseManager, SqliteActionRegistryStore, SqliteDlqStore, SqliteExecutionLogStore,
    SqliteIntentLedgerStore, SqliteQueueStore, SqliteSchemaRegistryStore, SqliteWireStore,
    SqliteWorkflowInstanceStore, SqliteWorkflowRegistryStore,
};
pub use escalation::LoggingEscalationSink;
