//! Session Wires — the seven Brain-owned fields consumed by the intent
//! detector on the next turn (§3, §4.12), plus the Streaming Bus event
//! type they embed (§4.10).

use crate::intent::IntentSummary;
use crate::task::ActiveTask;
use brain_types::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationOption {
    pub yes_aliases: Vec<String>,
    pub no_aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberedOption {
    pub number: u32,
    pub label: String,
    pub aliases: Vec<String>,
}

/// A tagged variant describing the expected shape of the user's next
/// reply (§4.11). Replaces the source pattern's untyped "state dict".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerSheet {
    Confirmation {
        param_name: String,
        options: ConfirmationOption,
    },
    SingleChoice {
        param_name: String,
        options: Vec<NumberedOption>,
    },
    MultipleChoice {
        param_name: String,
        options: Vec<NumberedOption>,
        min_selections: u32,
        max_selections: u32,
    },
    Entity {
        param_name: String,
        format_regex: String,
    },
    Text {
        param_name: String,
        min_length: u32,
        max_length: u32,
    },
}

impl AnswerSheet {
    /// `available_signals` is derived deterministically as the union of
    /// all option keys and their aliases (§4.12).
    pub fn available_signals(&self) -> HashSet<String> {
        let mut signals = HashSet::new();
        match self {
            AnswerSheet::Confirmation { options, .. } => {
                signals.extend(options.yes_aliases.iter().cloned());
                signals.extend(options.no_aliases.iter().cloned());
            }
            AnswerSheet::SingleChoice { options, .. } | AnswerSheet::MultipleChoice { options, .. } => {
                for opt in options {
                    signals.insert(opt.number.to_string());
                    signals.insert(opt.label.clone());
                    signals.extend(opt.aliases.iter().cloned());
                }
            }
            AnswerSheet::Entity { .. } | AnswerSheet::Text { .. } => {}
        }
        signals
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingUpdateType {
    ActionLookup,
    ActionNotFound,
    IntentLogged,
    FetchingSchemas,
    SchemasFetched,
    CheckingEligibility,
    EligibilityChecked,
    ActionBlocked,
    CollectingParams,
    ActionQueued,
    ActionExecuting,
    ActionProgress,
    ActionCompleted,
    ActionFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingEvent {
    pub update_type: StreamingUpdateType,
    pub timestamp: DateTime<Utc>,
    pub context: serde_json::Value,
}

impl StreamingEvent {
    pub fn new(update_type: StreamingUpdateType, context: serde_json::Value) -> Self {
        Self {
            update_type,
            timestamp: Utc::now(),
            context,
        }
    }
}

/// Bounded ring of the most recent events for a session (I7/P5): strict
/// append-only with the oldest entry silently evicted past capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingRing {
    capacity: usize,
    events: VecDeque<StreamingEvent>,
}

impl StreamingRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, event: StreamingEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn latest(&self) -> Vec<StreamingEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWires {
    pub session_id: SessionId,
    pub expecting_response: bool,
    pub answer_sheet: Option<AnswerSheet>,
    pub active_task: Option<ActiveTask>,
    pub previous_intents: VecDeque<IntentSummary>,
    pub available_signals: HashSet<String>,
    pub conversation_context: serde_json::Value,
    pub popular_actions: Vec<String>,
}

impl SessionWires {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            expecting_response: false,
            answer_sheet: None,
            active_task: None,
            previous_intents: VecDeque::new(),
            available_signals: HashSet::new(),
            conversation_context: serde_json::Value::Null,
            popular_actions: Vec::new(),
        }
    }

    /// Rolling window of the last `window` ledger entry summaries
    /// (§4.12 default window is 5).
    pub fn push_intent(&mut self, summary: IntentSummary, window: usize) {
        if self.previous_intents.len() >= window {
            self.previous_intents.pop_front();
        }
        self.previous_intents.push_back(summary);
    }

    pub fn set_answer_sheet(&mut self, sheet: Option<AnswerSheet>) {
        self.available_signals = sheet
            .as_ref()
            .map(|s| s.available_signals())
            .unwrap_or_default();
        self.answer_sheet = sheet;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let mut ring = StreamingRing::new(20);
        for _ in 0..25 {
            ring.push(StreamingEvent::new(
                StreamingUpdateType::ActionProgress,
                serde_json::Value::Null,
            ));
        }
        assert_eq!(ring.len(), 20);
    }
}
