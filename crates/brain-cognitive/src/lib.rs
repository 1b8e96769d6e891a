//! Brain Cognitive — the stateful orchestration core.
//!
//! Ties the data model in `brain-core` to the storage and outbound-call
//! traits it defines: intent resolution, schema-state caching,
//! eligibility evaluation, action queue execution, workflow advancement,
//! narrative generation, and session wire updates, composed into the
//! per-turn pipeline.

pub mod eligibility;
pub mod narrative;
pub mod pipeline;
pub mod queue_executor;
pub mod resolver;
pub mod schema_cache;
pub mod session_lock;
pub mod streaming;
pub mod wires;
pub mod workflow;

pub use eligibility::{EligibilityEvaluator, ExecutionHistory, InFlightQueue, UserContext};
pub use narrative::{DetectionContext, GenerationInstruction, InstructionType, Narrative, NarrativeBuilder};
pub use pipeline::{IntentInput, TurnInput, TurnOutput, TurnPipeline};
pub use queue_executor::{ProcessOutcome, QueueExecutor};
pub use schema_cache::SchemaStateCache;
pub use session_lock::SessionLockRegistry;
pub use streaming::StreamingBus;
pub use wires::{WireUpdater, PREVIOUS_INTENTS_WINDOW};
pub use workflow::WorkflowEngine;
