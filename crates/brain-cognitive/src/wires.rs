//! Wire Updater (§4.12): folds a turn's outcome into the seven
//! Brain-owned Session Wires and persists them atomically alongside the
//! turn's checkpoint. `popular_actions` is sourced from `InstanceConfig`
//! (configuration data, not session state).

use brain_core::{InstanceConfig, IntentSummary, SessionWires};
use brain_core::{ActiveTask, AnswerSheet};
use brain_core::WireStore;
use brain_types::{Result, SessionId};
use std::sync::Arc;

/// Default rolling window for `previous_intents` (§4.12).
pub const PREVIOUS_INTENTS_WINDOW: usize = 5;

pub struct WireUpdater {
    store: Arc<dyn WireStore>,
}

impl WireUpdater {
    pub fn new(store: Arc<dyn WireStore>) -> Self {
        Self { store }
    }

    pub async fn load_or_new(&self, session_id: &SessionId) -> Result<SessionWires> {
        Ok(self
            .store
            .load(session_id)
            .await?
            .unwrap_or_else(|| SessionWires::new(session_id.clone())))
    }

    /// Records the turn's intent in the rolling window, independent of
    /// whether the intent reached an answer-expecting state.
    pub fn record_intent(&self, wires: &mut SessionWires, summary: IntentSummary) {
        wires.push_intent(summary, PREVIOUS_INTENTS_WINDOW);
    }

    /// Sets the active task and, when the task is awaiting a reply,
    /// the matching `answer_sheet`/`available_signals` (derived
    /// deterministically by `AnswerSheet::available_signals`).
    pub fn set_active_task(&self, wires: &mut SessionWires, task: Option<ActiveTask>, answer_sheet: Option<AnswerSheet>) {
        wires.expecting_response = answer_sheet.is_some();
        wires.set_answer_sheet(answer_sheet);
        wires.active_task = task;
    }

    pub fn clear_expectation(&self, wires: &mut SessionWires) {
        wires.expecting_response = false;
        wires.set_answer_sheet(None);
    }

    pub fn apply_instance_config(&self, wires: &mut SessionWires, config: &InstanceConfig) {
        wires.popular_actions = config.popular_actions.clone();
    }

    pub fn set_conversation_context(&self, wires: &mut SessionWires, context: serde_json::Value) {
        wires.conversation_context = context;
    }

    pub async fn save(&self, wires: &SessionWires) -> Result<()> {
        self.store.save(wires).await
    }
}
