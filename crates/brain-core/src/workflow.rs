//! Workflow Definition and Workflow Instance — ordered, dependency-aware
//! sequences of actions with optional compensating rollback (§3, §4.8).

use brain_types::{ActionId, QueueId, SessionId, WorkflowId, WorkflowInstanceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    Abort,
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepDefinition {
    pub sequence_id: String,
    pub action_id: ActionId,
    pub required: bool,
    pub on_failure: OnFailure,
    pub depends_on: Vec<String>,
    pub rollback_on_workflow_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow_id: WorkflowId,
    pub steps: Vec<WorkflowStepDefinition>,
}

impl WorkflowDefinition {
    pub fn step(&self, sequence_id: &str) -> Option<&WorkflowStepDefinition> {
        self.steps.iter().find(|s| s.sequence_id == sequence_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Ready,
    Executing,
    Completed,
    Failed,
    Skipped,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepExecution {
    pub sequence_id: String,
    pub queue_id: Option<QueueId>,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowInstanceStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub workflow_instance_id: WorkflowInstanceId,
    pub workflow_id: WorkflowId,
    pub session_id: SessionId,
    pub status: WorkflowInstanceStatus,
    pub steps_total: usize,
    pub steps_executed: Vec<WorkflowStepExecution>,
    pub started_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
    pub rollback_performed: bool,
    /// Snapshot of the triggering turn's user context, carried onto
    /// every Queue Entry this instance enqueues so a later eligibility
    /// re-check (§4.6 step 2) has a context to evaluate against.
    pub user_tier: String,
    pub authenticated: bool,
}

impl WorkflowInstance {
    pub fn new(
        workflow_id: WorkflowId,
        session_id: SessionId,
        definition: &WorkflowDefinition,
        timeout_ms: u64,
        user_tier: String,
        authenticated: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_instance_id: WorkflowInstanceId::new(),
            workflow_id,
            session_id,
            status: WorkflowInstanceStatus::InProgress,
            steps_total: definition.steps.len(),
            steps_executed: definition
                .steps
                .iter()
                .map(|s| WorkflowStepExecution {
                    sequence_id: s.sequence_id.clone(),
                    queue_id: None,
                    status: StepStatus::Pending,
                })
                .collect(),
            started_at: now,
            timeout_at: now + chrono::Duration::milliseconds(timeout_ms as i64),
            rollback_performed: false,
            user_tier,
            authenticated,
        }
    }

    pub fn step_mut(&mut self, sequence_id: &str) -> Option<&mut WorkflowStepExecution> {
        self.steps_executed.iter_mut().find(|s| s.sequence_id == sequence_id)
    }

    pub fn step(&self, sequence_id: &str) -> Option<&WorkflowStepExecution> {
        self.steps_executed.iter().find(|s| s.sequence_id == sequence_id)
    }

    /// Finds the step a given Queue Entry was enqueued for, so the
    /// Queue Executor can fold that entry's outcome back into the
    /// workflow instance (§4.8) without the caller tracking the
    /// mapping itself.
    pub fn step_for_queue_id(&self, queue_id: &QueueId) -> Option<&WorkflowStepExecution> {
        self.steps_executed.iter().find(|s| s.queue_id.as_ref() == Some(queue_id))
    }

    /// I5/P7: a step may transition to `executing` only once every
    /// `depends_on` step is `completed`.
    pub fn dependencies_satisfied(&self, step: &WorkflowStepDefinition) -> bool {
        step.depends_on.iter().all(|dep| {
            self.step(dep)
                .map(|s| matches!(s.status, StepStatus::Completed | StepStatus::Skipped))
                .unwrap_or(false)
        })
    }

    /// Steps already `completed`, in reverse completion order, for
    /// rollback enqueueing (§4.8, scenario 7).
    pub fn completed_steps_reverse(&self) -> Vec<String> {
        self.steps_executed
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.sequence_id.clone())
            .rev()
            .collect()
    }

    pub fn is_past_timeout(&self, now: DateTime<Utc>) -> bool {
        now > self.timeout_at
    }

    pub fn all_required_complete(&self, definition: &WorkflowDefinition) -> bool {
        definition.steps.iter().all(|s| {
            if !s.required {
                return true;
            }
            self.step(&s.sequence_id)
                .map(|e| e.status == StepStatus::Completed)
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> WorkflowDefinition {
        WorkflowDefinition {
            workflow_id: WorkflowId::from("onboarding"),
            steps: vec![
                WorkflowStepDefinition {
                    sequence_id: "1".to_string(),
                    action_id: ActionId::from("a1"),
                    required: true,
                    on_failure: OnFailure::Abort,
                    depends_on: vec![],
                    rollback_on_workflow_failure: true,
                },
                WorkflowStepDefinition {
                    sequence_id: "2".to_string(),
                    action_id: ActionId::from("a2"),
                    required: true,
                    on_failure: OnFailure::Abort,
                    depends_on: vec!["1".to_string()],
                    rollback_on_workflow_failure: true,
                },
            ],
        }
    }

    #[test]
    fn step_2_requires_step_1_complete() {
        let definition = def();
        let mut wf = WorkflowInstance::new(
            WorkflowId::from("onboarding"),
            SessionId::from("s1"),
            &definition,
            60_000,
            "standard".to_string(),
            true,
        );
        assert!(!wf.dependencies_satisfied(&definition.steps[1]));
        wf.step_mut("1").unwrap().status = StepStatus::Completed;
        assert!(wf.dependencies_satisfied(&definition.steps[1]));
    }

    #[test]
    fn timeout_after_completion_does_not_revive() {
        let definition = def();
        let mut wf = WorkflowInstance::new(
            WorkflowId::from("onboarding"),
            SessionId::from("s1"),
            &definition,
            0,
            "standard".to_string(),
            true,
        );
        wf.status = WorkflowInstanceStatus::Failed;
        assert!(wf.is_past_timeout(Utc::now()));
        // A late completion of an in-flight step must not flip a
        // terminal workflow instance back to in_progress.
        wf.step_mut("2").unwrap().status = StepStatus::Completed;
        assert_eq!(wf.status, WorkflowInstanceStatus::Failed);
    }
}
