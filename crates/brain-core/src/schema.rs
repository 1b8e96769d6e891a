//! Schema Definition and Schema State — the per-brand data contract and
//! its per-session fetched snapshot (§3, §4.4).

use brain_types::{BrandId, SchemaId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    None,
    Incomplete,
    Complete,
}

/// How a key's completion status is derived from the fetched JSON value
/// at `api_field_path` (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "logic", rename_all = "snake_case")]
pub enum CompletionLogic {
    NonEmpty {
        /// Optional extra validation (e.g. a format regex); value fails
        /// this makes the key `incomplete` rather than `complete`.
        validation_regex: Option<String>,
    },
    NestedObject {
        required_subkeys: Vec<String>,
    },
    ArrayNonEmpty,
    EnumValue {
        allowed: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaKeyDefinition {
    pub key_name: String,
    pub required: bool,
    pub api_field_path: String,
    pub completion_logic: CompletionLogic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub brand_id: BrandId,
    pub schema_id: SchemaId,
    pub api_endpoint: String,
    pub api_method: String,
    pub auth_spec: String,
    pub timeout_ms: u64,
    pub cache_ttl_ms: u64,
    pub stale_tolerance_ms: u64,
    pub keys: Vec<SchemaKeyDefinition>,
}

impl SchemaDefinition {
    pub fn required_keys(&self) -> impl Iterator<Item = &SchemaKeyDefinition> {
        self.keys.iter().filter(|k| k.required)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStatus {
    Ok,
    Stale,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStatus {
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedKey {
    pub status: KeyStatus,
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaState {
    pub session_id: SessionId,
    pub schema_id: SchemaId,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub api_status: ApiStatus,
    pub keys: HashMap<String, FetchedKey>,
    pub schema_status: SchemaStatus,
    pub completion_percent: u8,
}

impl SchemaState {
    /// Derives `schema_status`/`completion_percent` from key statuses and
    /// the schema's required-key list, per I4 and the §9 zero-required
    /// convention (complete, 100%, when there are no required keys).
    pub fn derive(
        session_id: SessionId,
        schema_id: SchemaId,
        fetched_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        api_status: ApiStatus,
        keys: HashMap<String, FetchedKey>,
        required_key_names: &[String],
    ) -> Self {
        let total_required = required_key_names.len();
        let complete_required = required_key_names
            .iter()
            .filter(|name| {
                keys.get(*name)
                    .map(|k| k.status == KeyStatus::Complete)
                    .unwrap_or(false)
            })
            .count();

        let (schema_status, completion_percent) = if total_required == 0 {
            (SchemaStatus::Complete, 100)
        } else if complete_required == total_required {
            (SchemaStatus::Complete, 100)
        } else {
            let percent = ((complete_required as f64 / total_required as f64) * 100.0).round() as u8;
            (SchemaStatus::Incomplete, percent)
        };

        Self {
            session_id,
            schema_id,
            fetched_at,
            expires_at,
            api_status,
            keys,
            schema_status,
            completion_percent,
        }
    }

    /// Synthetic "all none" state returned on fetch failure with no
    /// usable stale entry (§4.4).
    pub fn synthetic_error(
        session_id: SessionId,
        schema_id: SchemaId,
        now: DateTime<Utc>,
        required_key_names: &[String],
    ) -> Self {
        let keys = required_key_names
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    FetchedKey {
                        status: KeyStatus::None,
                        value: None,
                    },
                )
            })
            .collect();
        Self {
            session_id,
            schema_id,
            fetched_at: now,
            expires_at: now,
            api_status: ApiStatus::Error,
            keys,
            schema_status: if required_key_names.is_empty() {
                SchemaStatus::Complete
            } else {
                SchemaStatus::Incomplete
            },
            completion_percent: if required_key_names.is_empty() { 100 } else { 0 },
        }
    }

    /// B3: at exactly `expires_at`, the entry is expired.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// B4: stale iff a failure occurred and `now - fetched_at <= stale_tolerance_ms`.
    pub fn is_within_stale_tolerance(&self, now: DateTime<Utc>, stale_tolerance_ms: u64) -> bool {
        let age_ms = (now - self.fetched_at).num_milliseconds().max(0) as u64;
        age_ms <= stale_tolerance_ms
    }

    pub fn key_status(&self, key_name: &str) -> KeyStatus {
        self.keys
            .get(key_name)
            .map(|k| k.status)
            .unwrap_or(KeyStatus::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_required_keys_is_complete() {
        let state = SchemaState::derive(
            SessionId::from("s1"),
            SchemaId::from("profile"),
            Utc::now(),
            Utc::now(),
            ApiStatus::Ok,
            HashMap::new(),
            &[],
        );
        assert_eq!(state.schema_status, SchemaStatus::Complete);
        assert_eq!(state.completion_percent, 100);
    }

    #[test]
    fn expiry_boundary_is_expired_at_exactly_expires_at() {
        let now = Utc::now();
        let state = SchemaState::derive(
            SessionId::from("s1"),
            SchemaId::from("profile"),
            now,
            now,
            ApiStatus::Ok,
            HashMap::new(),
            &[],
        );
        assert!(!state.is_fresh(now));
    }
}
