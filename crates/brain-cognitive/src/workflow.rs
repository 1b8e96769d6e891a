//! Workflow Engine (§4.8): advances a `WorkflowInstance` by enqueuing
//! each step once its dependencies are satisfied, and runs rollback in
//! reverse completion order when a required step fails.

use brain_core::{
    ActionDefinition, OnFailure, QueueEntry, QueueStatus, StepStatus, WorkflowDefinition,
    WorkflowInstance, WorkflowInstanceStatus,
};
use brain_core::{QueueStore, WorkflowInstanceStore, WorkflowRegistryStore};
use brain_types::{IdempotencyKey, Result, SessionId, WorkflowId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::eligibility::UserContext;

pub struct WorkflowEngine {
    registry: Arc<dyn WorkflowRegistryStore>,
    instances: Arc<dyn WorkflowInstanceStore>,
    queue: Arc<dyn QueueStore>,
}

impl WorkflowEngine {
    pub fn new(
        registry: Arc<dyn WorkflowRegistryStore>,
        instances: Arc<dyn WorkflowInstanceStore>,
        queue: Arc<dyn QueueStore>,
    ) -> Self {
        Self { registry, instances, queue }
    }

    /// Instantiates a workflow on its triggering action and enqueues
    /// whichever steps are immediately ready (no unmet dependencies).
    pub async fn instantiate(
        &self,
        session_id: &SessionId,
        workflow_id: &WorkflowId,
        timeout_ms: u64,
        user: &UserContext,
        resolve_action: impl Fn(&brain_types::ActionId) -> Option<ActionDefinition>,
    ) -> Result<WorkflowInstance> {
        let definition = self
            .registry
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| brain_types::BrainError::NotFound(format!("workflow {workflow_id}")))?;

        let mut instance = WorkflowInstance::new(
            workflow_id.clone(),
            session_id.clone(),
            &definition,
            timeout_ms,
            user.tier.clone(),
            user.authenticated,
        );
        self.enqueue_ready_steps(&mut instance, &definition, &resolve_action).await?;
        self.instances.insert(&instance).await?;
        Ok(instance)
    }

    /// Enqueues a Queue Entry for every `pending` step whose
    /// dependencies are now satisfied, transitioning it to `ready`.
    async fn enqueue_ready_steps(
        &self,
        instance: &mut WorkflowInstance,
        definition: &WorkflowDefinition,
        resolve_action: &impl Fn(&brain_types::ActionId) -> Option<ActionDefinition>,
    ) -> Result<()> {
        let ready_sequence_ids: Vec<String> = definition
            .steps
            .iter()
            .filter(|step| {
                instance.step(&step.sequence_id).map(|s| s.status == StepStatus::Pending).unwrap_or(false)
                    && instance.dependencies_satisfied(step)
            })
            .map(|step| step.sequence_id.clone())
            .collect();

        for sequence_id in ready_sequence_ids {
            let step_def = definition.step(&sequence_id).expect("sequence_id drawn from definition.steps");
            let Some(action) = resolve_action(&step_def.action_id) else {
                warn!(action_id = %step_def.action_id, "workflow step references unknown action");
                continue;
            };

            let idempotency_key = IdempotencyKey::compute(&instance.session_id, &action.action_id, "{}");
            let mut entry = QueueEntry::new(
                instance.session_id.clone(),
                action.action_id.clone(),
                idempotency_key,
                std::collections::HashMap::new(),
                action.priority,
                action.retry_policy.max_retries,
                false,
                Some(instance.workflow_instance_id),
                instance.user_tier.clone(),
                instance.authenticated,
            );
            entry.checkpoint(QueueStatus::Ready);
            self.queue.insert(&entry).await?;

            let step = instance.step_mut(&sequence_id).expect("sequence_id drawn from definition.steps");
            step.queue_id = Some(entry.queue_id);
            step.status = StepStatus::Ready;
        }
        Ok(())
    }

    /// Folds a completed Queue Entry's outcome back into its workflow
    /// step, advancing the instance (enqueueing newly-ready steps,
    /// completing the instance, or aborting with rollback).
    pub async fn on_step_outcome(
        &self,
        workflow_instance_id: &brain_types::WorkflowInstanceId,
        sequence_id: &str,
        succeeded: bool,
        resolve_action: impl Fn(&brain_types::ActionId) -> Option<ActionDefinition>,
    ) -> Result<()> {
        let Some(mut instance) = self.instances.get(workflow_instance_id).await? else {
            return Ok(());
        };
        if instance.status != WorkflowInstanceStatus::InProgress {
            // B5: a late completion must never revive a terminal instance.
            return Ok(());
        }

        let definition = self
            .registry
            .get_workflow(&instance.workflow_id)
            .await?
            .ok_or_else(|| brain_types::BrainError::NotFound(format!("workflow {}", instance.workflow_id)))?;
        let step_def = definition
            .step(sequence_id)
            .ok_or_else(|| brain_types::BrainError::NotFound(format!("workflow step {sequence_id}")))?;

        if instance.is_past_timeout(chrono::Utc::now()) {
            instance.status = WorkflowInstanceStatus::Failed;
            self.instances.update(&instance).await?;
            return Ok(());
        }

        if succeeded {
            instance.step_mut(sequence_id).expect("step exists on its own instance").status = StepStatus::Completed;
            self.enqueue_ready_steps(&mut instance, &definition, &resolve_action).await?;
            if instance.all_required_complete(&definition) {
                instance.status = WorkflowInstanceStatus::Completed;
                info!(workflow_instance_id = %instance.workflow_instance_id, "workflow instance completed");
            }
            self.instances.update(&instance).await?;
            return Ok(());
        }

        instance.step_mut(sequence_id).expect("step exists on its own instance").status = StepStatus::Failed;

        match step_def.on_failure {
            OnFailure::Continue => {
                self.enqueue_ready_steps(&mut instance, &definition, &resolve_action).await?;
                self.instances.update(&instance).await?;
            }
            OnFailure::Abort if step_def.required => {
                instance.status = WorkflowInstanceStatus::Failed;
                self.instances.update(&instance).await?;
                self.rollback(&mut instance, &definition, &resolve_action).await?;
            }
            OnFailure::Abort => {
                self.enqueue_ready_steps(&mut instance, &definition, &resolve_action).await?;
                self.instances.update(&instance).await?;
            }
        }
        Ok(())
    }

    /// Enqueues each completed step's rollback action, reverse of
    /// completion order, skipping steps that opted out or have none
    /// (§4.8, scenario 7).
    async fn rollback(
        &self,
        instance: &mut WorkflowInstance,
        definition: &WorkflowDefinition,
        resolve_action: &impl Fn(&brain_types::ActionId) -> Option<ActionDefinition>,
    ) -> Result<()> {
        for sequence_id in instance.completed_steps_reverse() {
            let Some(step_def) = definition.step(&sequence_id) else { continue };
            if !step_def.rollback_on_workflow_failure {
                continue;
            }
            let Some(action) = resolve_action(&step_def.action_id) else { continue };
            let Some(rollback_action_id) = action.rollback_action_id.clone() else { continue };
            let Some(rollback_action) = resolve_action(&rollback_action_id) else { continue };

            let idempotency_key = IdempotencyKey::compute(&instance.session_id, &rollback_action_id, &sequence_id);
            let mut entry = QueueEntry::new(
                instance.session_id.clone(),
                rollback_action_id,
                idempotency_key,
                std::collections::HashMap::new(),
                rollback_action.priority,
                rollback_action.retry_policy.max_retries,
                false,
                Some(instance.workflow_instance_id),
                instance.user_tier.clone(),
                instance.authenticated,
            );
            entry.checkpoint(QueueStatus::Ready);
            self.queue.insert(&entry).await?;

            if let Some(step) = instance.step_mut(&sequence_id) {
                step.status = StepStatus::RolledBack;
            }
        }
        instance.rollback_performed = true;
        self.instances.update(instance).await?;
        Ok(())
    }

    /// Sweeps in-progress instances past their timeout, failing and
    /// rolling each one back (§4.8 timeout handling).
    pub async fn sweep_timeouts(
        &self,
        resolve_action: impl Fn(&brain_types::ActionId) -> Option<ActionDefinition>,
    ) -> Result<usize> {
        let now = chrono::Utc::now();
        let mut swept = 0;
        for mut instance in self.instances.list_in_progress().await? {
            if !instance.is_past_timeout(now) {
                continue;
            }
            let definition = self.registry.get_workflow(&instance.workflow_id).await?;
            instance.status = WorkflowInstanceStatus::Failed;
            self.instances.update(&instance).await?;
            if let Some(definition) = definition {
                self.rollback(&mut instance, &definition, &resolve_action).await?;
            }
            swept += 1;
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use brain_core::{Eligibility, OnFailure as OF, ParamValidation, Priority, RetryPolicy, WorkflowStepDefinition};
    use brain_types::{ActionId, InstanceId, WorkflowInstanceId};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryRegistry {
        workflows: HashMap<String, WorkflowDefinition>,
    }

    #[async_trait]
    impl WorkflowRegistryStore for InMemoryRegistry {
        async fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowDefinition>> {
            Ok(self.workflows.get(workflow_id.as_str()).cloned())
        }
    }

    #[derive(Default)]
    struct InMemoryInstances {
        instances: Mutex<HashMap<WorkflowInstanceId, WorkflowInstance>>,
    }

    #[async_trait]
    impl WorkflowInstanceStore for InMemoryInstances {
        async fn insert(&self, instance: &WorkflowInstance) -> Result<()> {
            self.instances.lock().unwrap().insert(instance.workflow_instance_id, instance.clone());
            Ok(())
        }
        async fn update(&self, instance: &WorkflowInstance) -> Result<()> {
            self.instances.lock().unwrap().insert(instance.workflow_instance_id, instance.clone());
            Ok(())
        }
        async fn get(&self, workflow_instance_id: &WorkflowInstanceId) -> Result<Option<WorkflowInstance>> {
            Ok(self.instances.lock().unwrap().get(workflow_instance_id).cloned())
        }
        async fn list_in_progress(&self) -> Result<Vec<WorkflowInstance>> {
            Ok(self
                .instances
                .lock()
                .unwrap()
                .values()
                .filter(|i| i.status == WorkflowInstanceStatus::InProgress)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct InMemoryQueue {
        entries: Mutex<Vec<QueueEntry>>,
    }

    #[async_trait]
    impl QueueStore for InMemoryQueue {
        async fn insert(&self, entry: &QueueEntry) -> Result<()> {
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
        async fn checkpoint(&self, entry: &QueueEntry) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            if let Some(existing) = entries.iter_mut().find(|e| e.queue_id == entry.queue_id) {
                *existing = entry.clone();
            }
            Ok(())
        }
        async fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<QueueEntry>> {
            Ok(self.entries.lock().unwrap().iter().find(|e| &e.idempotency_key == key).cloned())
        }
        async fn get(&self, queue_id: &brain_types::QueueId) -> Result<Option<QueueEntry>> {
            Ok(self.entries.lock().unwrap().iter().find(|e| &e.queue_id == queue_id).cloned())
        }
        async fn list_restorable(&self, session_id: &SessionId) -> Result<Vec<QueueEntry>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| &e.session_id == session_id && !e.status.is_terminal())
                .cloned()
                .collect())
        }
        async fn list_all_restorable(&self) -> Result<Vec<QueueEntry>> {
            Ok(self.entries.lock().unwrap().iter().filter(|e| !e.status.is_terminal()).cloned().collect())
        }
    }

    fn action(action_id: &str, rollback: Option<&str>) -> ActionDefinition {
        ActionDefinition {
            instance_id: InstanceId::from("inst"),
            action_id: ActionId::from(action_id),
            canonical_name: action_id.to_string(),
            synonyms: HashSet::new(),
            params_required: vec![],
            params_optional: vec![],
            param_validation: HashMap::<String, ParamValidation>::new(),
            eligibility: Eligibility::default(),
            retry_policy: RetryPolicy::default(),
            timeout_ms: 5_000,
            workflow_id: Some(WorkflowId::from("onboarding")),
            sequence_id: None,
            triggers_workflow: true,
            priority: Priority::Normal,
            rollback_action_id: rollback.map(ActionId::from),
            requires_user_ack: false,
            critical: false,
            is_active: true,
            api_endpoint: "https://example.test".to_string(),
            api_method: "POST".to_string(),
            success_criteria: "status_code == 200".to_string(),
            failure_criteria: None,
        }
    }

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition {
            workflow_id: WorkflowId::from("onboarding"),
            steps: vec![
                WorkflowStepDefinition {
                    sequence_id: "1".to_string(),
                    action_id: ActionId::from("create_account"),
                    required: true,
                    on_failure: OF::Abort,
                    depends_on: vec![],
                    rollback_on_workflow_failure: true,
                },
                WorkflowStepDefinition {
                    sequence_id: "2".to_string(),
                    action_id: ActionId::from("provision_seat"),
                    required: true,
                    on_failure: OF::Abort,
                    depends_on: vec!["1".to_string()],
                    rollback_on_workflow_failure: true,
                },
            ],
        }
    }

    fn actions() -> HashMap<String, ActionDefinition> {
        let mut map = HashMap::new();
        map.insert("create_account".to_string(), action("create_account", Some("delete_account")));
        map.insert("provision_seat".to_string(), action("provision_seat", Some("deprovision_seat")));
        map.insert("delete_account".to_string(), action("delete_account", None));
        map.insert("deprovision_seat".to_string(), action("deprovision_seat", None));
        map
    }

    fn engine(registry: InMemoryRegistry) -> (WorkflowEngine, Arc<InMemoryInstances>, Arc<InMemoryQueue>) {
        let instances = Arc::new(InMemoryInstances::default());
        let queue = Arc::new(InMemoryQueue::default());
        let engine = WorkflowEngine::new(Arc::new(registry), instances.clone(), queue.clone());
        (engine, instances, queue)
    }

    #[tokio::test]
    async fn second_step_enqueues_only_after_first_completes() {
        let mut registry = InMemoryRegistry::default();
        registry.workflows.insert("onboarding".to_string(), definition());
        let (engine, instances, queue) = engine(registry);
        let actions = actions();
        let resolve = |id: &ActionId| actions.get(id.as_str()).cloned();

        let session = SessionId::from("s1");
        let user = UserContext { tier: "standard".to_string(), authenticated: true };
        let instance = engine
            .instantiate(&session, &WorkflowId::from("onboarding"), 60_000, &user, resolve)
            .await
            .unwrap();

        assert_eq!(queue.entries.lock().unwrap().len(), 1);
        assert_eq!(instance.step("2").unwrap().status, StepStatus::Pending);

        engine
            .on_step_outcome(&instance.workflow_instance_id, "1", true, resolve)
            .await
            .unwrap();

        assert_eq!(queue.entries.lock().unwrap().len(), 2);
        let updated = instances.get(&instance.workflow_instance_id).await.unwrap().unwrap();
        assert_eq!(updated.step("2").unwrap().status, StepStatus::Ready);
    }

    #[tokio::test]
    async fn required_step_failure_rolls_back_completed_steps() {
        let mut registry = InMemoryRegistry::default();
        registry.workflows.insert("onboarding".to_string(), definition());
        let (engine, instances, queue) = engine(registry);
        let actions = actions();
        let resolve = |id: &ActionId| actions.get(id.as_str()).cloned();

        let session = SessionId::from("s1");
        let user = UserContext { tier: "standard".to_string(), authenticated: true };
        let instance = engine
            .instantiate(&session, &WorkflowId::from("onboarding"), 60_000, &user, resolve)
            .await
            .unwrap();

        engine
            .on_step_outcome(&instance.workflow_instance_id, "1", true, resolve)
            .await
            .unwrap();
        engine
            .on_step_outcome(&instance.workflow_instance_id, "2", false, resolve)
            .await
            .unwrap();

        let updated = instances.get(&instance.workflow_instance_id).await.unwrap().unwrap();
        assert_eq!(updated.status, WorkflowInstanceStatus::Failed);
        assert!(updated.rollback_performed);

        let entries = queue.entries.lock().unwrap();
        assert!(entries.iter().any(|e| e.action_id.as_str() == "delete_account"));
    }
}
