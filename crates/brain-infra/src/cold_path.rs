//! Cold-path trigger (§4.13): fire-and-forget after wires are written.
//! The Brain never reads its result within the same turn, so the
//! trigger only needs to hand off the reference and return.

use async_trait::async_trait;
use brain_core::ColdPathTrigger;
use brain_types::SessionId;
use tracing::info;

pub struct LoggingColdPathTrigger;

impl LoggingColdPathTrigger {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingColdPathTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ColdPathTrigger for LoggingColdPathTrigger {
    async fn trigger(&self, session_id: &SessionId, conversation_ref: &str) {
        info!(
            session_id = %session_id,
            conversation_ref = %conversation_ref,
            "dispatched cold-path summarization"
        );
    }
}
