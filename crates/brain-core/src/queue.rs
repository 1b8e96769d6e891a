//! Queue Entry and Execution Log Entry — the persistent per-session
//! priority queue and its append-only execution history (§3, §4.6).

use crate::action::Priority;
use brain_types::{ActionId, ExecutionId, IdempotencyKey, QueueId, SessionId, WorkflowInstanceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Ready,
    Executing,
    Retrying,
    Completed,
    Failed,
    Blocked,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub queue_id: QueueId,
    pub idempotency_key: IdempotencyKey,
    pub session_id: SessionId,
    pub action_id: ActionId,
    pub params_collected: HashMap<String, String>,
    pub params_missing: Vec<String>,
    pub status: QueueStatus,
    pub priority: Priority,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub retry_errors: Vec<String>,
    pub workflow_instance_id: Option<WorkflowInstanceId>,
    /// Snapshot of the triggering turn's user context, so a later
    /// processing pass (a subsequent turn's drain, or the background
    /// sweep, §4.6 step 2) can re-check eligibility without a live
    /// caller in scope.
    pub user_tier: String,
    pub authenticated: bool,
    pub added_at: DateTime<Utc>,
    pub checkpoint_at: DateTime<Utc>,
}

impl QueueEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        action_id: ActionId,
        idempotency_key: IdempotencyKey,
        params_collected: HashMap<String, String>,
        priority: Priority,
        max_retries: u32,
        dependencies_unmet: bool,
        workflow_instance_id: Option<WorkflowInstanceId>,
        user_tier: String,
        authenticated: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            queue_id: QueueId::new(),
            idempotency_key,
            session_id,
            action_id,
            params_collected,
            params_missing: Vec::new(),
            status: if dependencies_unmet {
                QueueStatus::Pending
            } else {
                QueueStatus::Ready
            },
            priority,
            retry_count: 0,
            max_retries,
            next_retry_at: None,
            retry_errors: Vec::new(),
            workflow_instance_id,
            user_tier,
            authenticated,
            added_at: now,
            checkpoint_at: now,
        }
    }

    /// Entries are eligible for a processing pass once `ready`, or once
    /// `retrying` with `next_retry_at <= now` (§4.6 ordering rules).
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            QueueStatus::Ready => true,
            QueueStatus::Retrying => self.next_retry_at.map(|t| t <= now).unwrap_or(false),
            _ => false,
        }
    }

    pub fn checkpoint(&mut self, status: QueueStatus) {
        self.status = status;
        self.checkpoint_at = Utc::now();
    }

    /// I3: schedules the next retry, enforcing `retry_count <= max_retries`.
    pub fn schedule_retry(&mut self, delay_ms: u64, error: String) {
        self.retry_count += 1;
        self.retry_errors.push(error);
        self.next_retry_at = Some(Utc::now() + chrono::Duration::milliseconds(delay_ms as i64));
        self.checkpoint(QueueStatus::Retrying);
    }

    /// B2: once `retry_count` has reached `max_retries`, the next
    /// failure must move to the DLQ rather than scheduling another retry.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Total ordering for a processing pass: non-ascending priority, ties by
/// ascending `added_at` (§4.6).
pub fn queue_processing_order(a: &QueueEntry, b: &QueueEntry) -> std::cmp::Ordering {
    b.priority.cmp(&a.priority).then(a.added_at.cmp(&b.added_at))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Executing,
    Completed,
    Failed,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub execution_id: ExecutionId,
    pub queue_id: QueueId,
    pub action_id: ActionId,
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub status: ExecutionStatus,
    pub retry_attempt: u32,
    pub params_used: HashMap<String, String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub idempotency_key: IdempotencyKey,
}

impl ExecutionLogEntry {
    pub fn start(
        queue_id: QueueId,
        action_id: ActionId,
        session_id: SessionId,
        retry_attempt: u32,
        params_used: HashMap<String, String>,
        idempotency_key: IdempotencyKey,
    ) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            queue_id,
            action_id,
            session_id,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            status: ExecutionStatus::Executing,
            retry_attempt,
            params_used,
            result: None,
            error: None,
            idempotency_key,
        }
    }

    pub fn complete(&mut self, result: serde_json::Value) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        self.status = ExecutionStatus::Completed;
        self.result = Some(result);
    }

    pub fn fail(&mut self, status: ExecutionStatus, error: String) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        self.status = status;
        self.error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_matches_defaults() {
        use crate::action::RetryPolicy;
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay_ms(1), 2_000);
        assert_eq!(policy.backoff_delay_ms(2), 4_000);
        assert_eq!(policy.backoff_delay_ms(3), 8_000);
        assert_eq!(policy.backoff_delay_ms(4), 16_000);
        assert_eq!(policy.backoff_delay_ms(10), 60_000);
    }

    #[test]
    fn ordering_is_priority_then_added_at() {
        let mut a = QueueEntry::new(
            SessionId::from("s"),
            ActionId::from("a"),
            IdempotencyKey("k1".to_string()),
            HashMap::new(),
            Priority::Low,
            3,
            false,
            None,
            "standard".to_string(),
            true,
        );
        let mut b = QueueEntry::new(
            SessionId::from("s"),
            ActionId::from("b"),
            IdempotencyKey("k2".to_string()),
            HashMap::new(),
            Priority::High,
            3,
            false,
            None,
            "standard".to_string(),
            true,
        );
        a.added_at = Utc::now();
        b.added_at = a.added_at + chrono::Duration::seconds(1);
        let mut entries = vec![a, b];
        entries.sort_by(queue_processing_order);
        assert_eq!(entries[0].priority, Priority::High);
    }
}
