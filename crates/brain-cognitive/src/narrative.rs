//! Narrative Builder (§4.11): given an intent's final state, produces
//! the next-turn generation instruction and the `answer_sheet` the
//! Wire Updater will expose alongside it.

use brain_core::{ActionDefinition, AnswerSheet, ChoiceOption, ConfirmationOption, NumberedOption, ParamValidation};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionType {
    AskForParams,
    HandleBlocker,
    ReportProgress,
    ReportCompletion,
    ReportError,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationInstruction {
    pub instruction_type: InstructionType,
    pub primary_instruction: String,
    pub optional_context: Option<serde_json::Value>,
    pub tone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionContext {
    pub expecting_response: bool,
    pub answer_sheet: Option<AnswerSheet>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Narrative {
    pub generation_instruction: GenerationInstruction,
    pub detection_context: DetectionContext,
}

pub struct NarrativeBuilder;

impl NarrativeBuilder {
    pub fn ask_for_params(param_name: &str, validation: &ParamValidation) -> Narrative {
        let answer_sheet = Self::answer_sheet_for(param_name, validation);
        Narrative {
            generation_instruction: GenerationInstruction {
                instruction_type: InstructionType::AskForParams,
                primary_instruction: format!("ask the user for {param_name}"),
                optional_context: None,
                tone: None,
            },
            detection_context: DetectionContext {
                expecting_response: true,
                answer_sheet: Some(answer_sheet),
            },
        }
    }

    pub fn handle_blocker(reasons: &[String], answer_sheet: Option<AnswerSheet>) -> Narrative {
        let expecting_response = answer_sheet.is_some();
        Narrative {
            generation_instruction: GenerationInstruction {
                instruction_type: InstructionType::HandleBlocker,
                primary_instruction: "explain why this action cannot proceed".to_string(),
                optional_context: Some(serde_json::json!({ "reasons": reasons })),
                tone: None,
            },
            detection_context: DetectionContext {
                expecting_response,
                answer_sheet,
            },
        }
    }

    pub fn report_progress() -> Narrative {
        Narrative {
            generation_instruction: GenerationInstruction {
                instruction_type: InstructionType::ReportProgress,
                primary_instruction: "let the user know the action is in progress".to_string(),
                optional_context: None,
                tone: None,
            },
            detection_context: DetectionContext {
                expecting_response: false,
                answer_sheet: None,
            },
        }
    }

    pub fn report_completion(result: Option<serde_json::Value>) -> Narrative {
        Narrative {
            generation_instruction: GenerationInstruction {
                instruction_type: InstructionType::ReportCompletion,
                primary_instruction: "confirm the action completed successfully".to_string(),
                optional_context: result,
                tone: None,
            },
            detection_context: DetectionContext {
                expecting_response: false,
                answer_sheet: None,
            },
        }
    }

    pub fn report_error(reason: &str) -> Narrative {
        Narrative {
            generation_instruction: GenerationInstruction {
                instruction_type: InstructionType::ReportError,
                primary_instruction: "explain that the request could not be completed".to_string(),
                optional_context: Some(serde_json::json!({ "reason": reason })),
                tone: None,
            },
            detection_context: DetectionContext {
                expecting_response: false,
                answer_sheet: None,
            },
        }
    }

    /// Synthesizes the `answer_sheet` for an E2 (ineligible) exit, when
    /// the blocker is one the user can resolve by supplying missing
    /// profile data (§4.11, Concrete Scenario 4). Only
    /// `schema_dependency_failed:<schema>.<key>` reasons are resolvable
    /// this way — tier restrictions, auth requirements, named blockers,
    /// action dependencies, and conflicting opposites all require
    /// something other than a user answer, so they fall through to
    /// `None` (`expecting_response` stays `false`).
    pub fn answer_sheet_for_blocker(reasons: &[String], action: &ActionDefinition) -> Option<AnswerSheet> {
        let key_name = reasons.iter().find_map(|reason| {
            let rest = reason.strip_prefix("schema_dependency_failed:")?;
            let (_schema_id, key_name) = rest.split_once('.')?;
            Some(key_name.to_string())
        })?;

        let answer_sheet = match action.param_validation.get(&key_name) {
            Some(validation) => Self::answer_sheet_for(&key_name, validation),
            None => AnswerSheet::Entity {
                param_name: key_name.clone(),
                format_regex: ".*".to_string(),
            },
        };
        Some(answer_sheet)
    }

    /// Picks the `answer_sheet` variant from the action's
    /// `param_validation` entry for the first missing param (§4.11).
    pub fn answer_sheet_for(param_name: &str, validation: &ParamValidation) -> AnswerSheet {
        match validation {
            ParamValidation::Confirmation { yes_aliases, no_aliases } => AnswerSheet::Confirmation {
                param_name: param_name.to_string(),
                options: ConfirmationOption {
                    yes_aliases: yes_aliases.clone(),
                    no_aliases: no_aliases.clone(),
                },
            },
            ParamValidation::SingleChoice { options } => AnswerSheet::SingleChoice {
                param_name: param_name.to_string(),
                options: numbered(options),
            },
            ParamValidation::MultipleChoice {
                options,
                min_selections,
                max_selections,
            } => AnswerSheet::MultipleChoice {
                param_name: param_name.to_string(),
                options: numbered(options),
                min_selections: *min_selections,
                max_selections: *max_selections,
            },
            ParamValidation::Entity { format_regex } => AnswerSheet::Entity {
                param_name: param_name.to_string(),
                format_regex: format_regex.clone(),
            },
            ParamValidation::Text { min_length, max_length } => AnswerSheet::Text {
                param_name: param_name.to_string(),
                min_length: *min_length,
                max_length: *max_length,
            },
        }
    }
}

fn numbered(options: &[ChoiceOption]) -> Vec<NumberedOption> {
    options
        .iter()
        .enumerate()
        .map(|(idx, opt)| NumberedOption {
            number: (idx + 1) as u32,
            label: opt.label.clone(),
            aliases: opt.aliases.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_for_params_expects_a_response() {
        let validation = ParamValidation::Entity {
            format_regex: "^https?://".to_string(),
        };
        let narrative = NarrativeBuilder::ask_for_params("resume_url", &validation);
        assert_eq!(narrative.generation_instruction.instruction_type, InstructionType::AskForParams);
        assert!(narrative.detection_context.expecting_response);
        assert!(matches!(
            narrative.detection_context.answer_sheet,
            Some(AnswerSheet::Entity { .. })
        ));
    }

    #[test]
    fn completion_does_not_expect_a_response() {
        let narrative = NarrativeBuilder::report_completion(None);
        assert!(!narrative.detection_context.expecting_response);
    }

    fn process_payment_action() -> ActionDefinition {
        use brain_core::{Eligibility, Priority, RetryPolicy};
        use brain_types::{ActionId, InstanceId};
        use std::collections::{HashMap as Map, HashSet};

        let mut param_validation = Map::new();
        param_validation.insert(
            "phone".to_string(),
            ParamValidation::Entity {
                format_regex: r"^\+?[0-9]{7,15}$".to_string(),
            },
        );

        ActionDefinition {
            instance_id: InstanceId::from("inst"),
            action_id: ActionId::from("process_payment"),
            canonical_name: "process_payment".to_string(),
            synonyms: HashSet::new(),
            params_required: vec![],
            params_optional: vec![],
            param_validation,
            eligibility: Eligibility::default(),
            retry_policy: RetryPolicy::default(),
            timeout_ms: 5_000,
            workflow_id: None,
            sequence_id: None,
            triggers_workflow: false,
            priority: Priority::Normal,
            rollback_action_id: None,
            requires_user_ack: false,
            critical: false,
            is_active: true,
            api_endpoint: "https://example.test/pay".to_string(),
            api_method: "POST".to_string(),
            success_criteria: "status_code == 200".to_string(),
            failure_criteria: None,
        }
    }

    #[test]
    fn schema_dependency_blocker_with_known_param_synthesizes_its_answer_sheet() {
        let action = process_payment_action();
        let reasons = vec!["schema_dependency_failed:profile.phone".to_string()];
        let answer_sheet = NarrativeBuilder::answer_sheet_for_blocker(&reasons, &action);
        assert!(matches!(
            answer_sheet,
            Some(AnswerSheet::Entity { ref param_name, .. }) if param_name == "phone"
        ));

        let narrative = NarrativeBuilder::handle_blocker(&reasons, answer_sheet);
        assert!(narrative.detection_context.expecting_response);
    }

    #[test]
    fn schema_dependency_blocker_with_unknown_param_falls_back_to_generic_entity() {
        let action = process_payment_action();
        let reasons = vec!["schema_dependency_failed:profile.shoe_size".to_string()];
        let answer_sheet = NarrativeBuilder::answer_sheet_for_blocker(&reasons, &action);
        assert!(matches!(
            answer_sheet,
            Some(AnswerSheet::Entity { ref param_name, .. }) if param_name == "shoe_size"
        ));
    }

    #[test]
    fn tier_restriction_blocker_does_not_expect_a_response() {
        let action = process_payment_action();
        let reasons = vec!["user_tier_not_allowed:free".to_string()];
        let answer_sheet = NarrativeBuilder::answer_sheet_for_blocker(&reasons, &action);
        assert!(answer_sheet.is_none());

        let narrative = NarrativeBuilder::handle_blocker(&reasons, answer_sheet);
        assert!(!narrative.detection_context.expecting_response);
    }
}
