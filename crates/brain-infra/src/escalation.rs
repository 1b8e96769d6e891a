//! Escalation sink for DLQ entries flagged `requires_manual_intervention`
//! (§4.6 step 5). A real deployment would file a ticket against some
//! external system; absent one, we log the escalation and mint a
//! reference the operator can grep for.

use async_trait::async_trait;
use brain_core::EscalationSink;
use brain_types::{ActionId, DlqId, Result};
use tracing::warn;

pub struct LoggingEscalationSink;

impl LoggingEscalationSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingEscalationSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EscalationSink for LoggingEscalationSink {
    async fn escalate(&self, dlq_id: &DlqId, action_id: &ActionId, final_error: &str) -> Result<String> {
        let ticket_id = format!("ESC-{}", dlq_id);
        warn!(
            dlq_id = %dlq_id,
            action_id = %action_id,
            final_error = %final_error,
            ticket_id = %ticket_id,
            "escalating dead-lettered action for manual intervention"
        );
        Ok(ticket_id)
    }
}
