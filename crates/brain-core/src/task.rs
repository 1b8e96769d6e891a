//! Active Task — the mutable, at-most-one-per-session record of an
//! in-progress action's parameter-collection state (§3, I1/P1).

use brain_types::{ActionId, SessionId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Initiated,
    CollectingParams,
    ReadyToExecute,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTask {
    pub task_id: TaskId,
    pub session_id: SessionId,
    pub canonical_action: ActionId,
    pub params_required: Vec<String>,
    pub params_collected: HashMap<String, String>,
    pub params_missing: Vec<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActiveTask {
    pub fn new(
        session_id: SessionId,
        canonical_action: ActionId,
        params_required: Vec<String>,
        params_collected: HashMap<String, String>,
    ) -> Self {
        let params_missing = params_required
            .iter()
            .filter(|p| !params_collected.contains_key(*p))
            .cloned()
            .collect::<Vec<_>>();
        let status = if params_missing.is_empty() {
            TaskStatus::ReadyToExecute
        } else {
            TaskStatus::CollectingParams
        };
        let now = Utc::now();
        Self {
            task_id: TaskId::new(),
            session_id,
            canonical_action,
            params_required,
            params_collected,
            params_missing,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Folds newly supplied entities into the task's collected params and
    /// recomputes `params_missing`/`status`.
    pub fn collect(&mut self, entities: &HashMap<String, String>) {
        for (k, v) in entities {
            if self.params_required.contains(k) {
                self.params_collected.insert(k.clone(), v.clone());
            }
        }
        self.params_missing = self
            .params_required
            .iter()
            .filter(|p| !self.params_collected.contains_key(*p))
            .cloned()
            .collect();
        self.status = if self.params_missing.is_empty() {
            TaskStatus::ReadyToExecute
        } else {
            TaskStatus::CollectingParams
        };
        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// At most one `ActiveTask` may exist per session (I1/P1). This holder
/// is the enforcement point: replacing a non-terminal task is rejected.
#[derive(Debug, Default)]
pub struct ActiveTaskSlot(Option<ActiveTask>);

impl ActiveTaskSlot {
    pub fn get(&self) -> Option<&ActiveTask> {
        self.0.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut ActiveTask> {
        self.0.as_mut()
    }

    /// Installs a new active task, returning the prior one if its status
    /// was already terminal (otherwise I1 would be violated).
    pub fn install(&mut self, task: ActiveTask) -> Result<Option<ActiveTask>, brain_types::BrainError> {
        if let Some(existing) = &self.0 {
            if !existing.status.is_terminal() {
                return Err(brain_types::BrainError::Internal(format!(
                    "session {} already has a non-terminal active task",
                    existing.session_id
                )));
            }
        }
        Ok(self.0.replace(task))
    }

    pub fn clear(&mut self) -> Option<ActiveTask> {
        self.0.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cannot_install_over_non_terminal_task() {
        let mut slot = ActiveTaskSlot::default();
        let t1 = ActiveTask::new(
            SessionId::from("s1"),
            ActionId::from("apply_job"),
            vec!["resume_url".to_string()],
            HashMap::new(),
        );
        slot.install(t1).unwrap();
        let t2 = ActiveTask::new(
            SessionId::from("s1"),
            ActionId::from("withdraw_job"),
            vec![],
            HashMap::new(),
        );
        assert!(slot.install(t2).is_err());
    }
}
