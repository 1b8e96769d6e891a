//! Intent Ledger Entry — the append-mostly per-session record of every
//! detected intent and its lifecycle (§3, §4.7).

use brain_types::{ActionId, BrainError, IntentId, Result, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Action,
    Help,
    Response,
    Unknown,
    Greeting,
    Goodbye,
    Gratitude,
    Chitchat,
}

impl IntentType {
    /// Self-response intent types bypass the Brain entirely: they are
    /// recorded in `previous_intents` by the Wire Updater but never
    /// enter the Turn Pipeline.
    pub fn bypasses_pipeline(self) -> bool {
        matches!(
            self,
            IntentType::Response
                | IntentType::Greeting
                | IntentType::Goodbye
                | IntentType::Gratitude
                | IntentType::Chitchat
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Synonym,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    New,
    Processing,
    Queued,
    Executing,
    Completed,
    Blocked,
    ActionNotFound,
    Failed,
    Cancelled,
}

impl IntentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IntentStatus::Completed
                | IntentStatus::Blocked
                | IntentStatus::ActionNotFound
                | IntentStatus::Failed
                | IntentStatus::Cancelled
        )
    }

    /// Enforces I6 and the transition diagram of §4.7: any non-terminal
    /// status may short-circuit directly into one of the exit terminals
    /// (`blocked`, `action_not_found`, `failed`, `cancelled`) — this is
    /// how Exit E1/E2 and per-intent error isolation work — while
    /// `completed` is reachable only from `executing`, and the forward
    /// chain `new -> processing -> queued -> executing` is otherwise
    /// the only way to advance.
    pub fn can_transition_to(self, next: IntentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        use IntentStatus::*;
        match next {
            Blocked | ActionNotFound | Failed | Cancelled => true,
            Completed => self == Executing,
            Processing => self == New,
            Queued => self == Processing,
            Executing => self == Queued,
            New => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentLedgerEntry {
    pub intent_id: IntentId,
    pub session_id: SessionId,
    pub turn_number: u64,
    pub intent_type: IntentType,
    pub canonical_intent: String,
    pub match_type: MatchType,
    pub confidence: f64,
    pub entities: HashMap<String, String>,
    pub status: IntentStatus,
    pub triggered_actions: Vec<ActionId>,
    pub blocked_reason: Option<String>,
    pub resolution: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntentLedgerEntry {
    pub fn new(
        session_id: SessionId,
        turn_number: u64,
        intent_type: IntentType,
        canonical_intent: String,
        match_type: MatchType,
        confidence: f64,
        entities: HashMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            intent_id: IntentId::new(),
            session_id,
            turn_number,
            intent_type,
            canonical_intent,
            match_type,
            confidence,
            entities,
            status: IntentStatus::New,
            triggered_actions: Vec::new(),
            blocked_reason: None,
            resolution: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a status transition, enforcing I6/P6.
    pub fn transition(&mut self, next: IntentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(BrainError::Internal(format!(
                "illegal intent status transition {:?} -> {:?} for {}",
                self.status, next, self.intent_id
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_blocked(&mut self, reason: String) -> Result<()> {
        self.blocked_reason = Some(reason);
        self.transition(IntentStatus::Blocked)
    }

    pub fn mark_action_not_found(&mut self) -> Result<()> {
        self.transition(IntentStatus::ActionNotFound)
    }

    pub fn mark_failed(&mut self, error: String) -> Result<()> {
        self.error = Some(error);
        self.transition(IntentStatus::Failed)
    }

    /// A compact summary used for `previous_intents` in the Session Wires.
    pub fn summary(&self) -> IntentSummary {
        IntentSummary {
            intent_id: self.intent_id,
            canonical_intent: self.canonical_intent.clone(),
            match_type: self.match_type,
            status: self.status,
            turn_number: self.turn_number,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSummary {
    pub intent_id: IntentId,
    pub canonical_intent: String,
    pub match_type: MatchType,
    pub status: IntentStatus,
    pub turn_number: u64,
}
