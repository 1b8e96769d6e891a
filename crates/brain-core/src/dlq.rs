//! Dead-Letter Store entries — terminal records of exhausted actions
//! awaiting manual intervention (§3, §4.9).

use crate::queue::QueueEntry;
use brain_types::{ActionId, DlqId, QueueId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub dlq_id: DlqId,
    pub original_queue_id: QueueId,
    pub action_id: ActionId,
    pub final_error: String,
    pub retry_history: Vec<String>,
    pub moved_at: DateTime<Utc>,
    pub requires_manual_intervention: bool,
    pub escalation_ticket_id: Option<String>,
    pub resolved: bool,
    pub resolution_notes: Option<String>,
}

impl DlqEntry {
    pub fn new(
        original_queue_id: QueueId,
        action_id: ActionId,
        final_error: String,
        retry_history: Vec<String>,
        requires_manual_intervention: bool,
    ) -> Self {
        Self {
            dlq_id: DlqId::new(),
            original_queue_id,
            action_id,
            final_error,
            retry_history,
            moved_at: Utc::now(),
            requires_manual_intervention,
            escalation_ticket_id: None,
            resolved: false,
            resolution_notes: None,
        }
    }

    pub fn resolve(&mut self, notes: String) {
        self.resolved = true;
        self.resolution_notes = Some(notes);
    }

    /// Builds the fresh Queue Entry a `retry=true` resolution requeues
    /// (§4.9): `retry_count` resets to zero and a new `queue_id` (and
    /// thus a new `execution_id` once it runs) are issued, but the
    /// idempotency key is carried over unchanged so a prior completion
    /// under the old entry still dedupes against this one.
    pub fn build_retry_entry(&self, original: &QueueEntry) -> QueueEntry {
        let mut entry = QueueEntry::new(
            original.session_id.clone(),
            original.action_id.clone(),
            original.idempotency_key.clone(),
            original.params_collected.clone(),
            original.priority,
            original.max_retries,
            false,
            original.workflow_instance_id,
            original.user_tier.clone(),
            original.authenticated,
        );
        entry.checkpoint(crate::queue::QueueStatus::Ready);
        entry
    }
}
