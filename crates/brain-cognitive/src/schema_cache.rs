//! Schema State Cache (§4.4): per-session cache of fetched schema
//! data, TTL-governed with stale-fallback on upstream failure and
//! single-flighted concurrent fetches for the same `(session_id,
//! schema_id)` pair. Not durable across session end — only the latest
//! entry per key lives in memory.

use brain_core::{
    ApiStatus, CompletionLogic, FetchedKey, KeyStatus, SchemaDefinition, SchemaFetcher, SchemaState,
};
use brain_types::{Result, SchemaId, SessionId};
use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

type CacheKey = (SessionId, SchemaId);

pub struct SchemaStateCache {
    fetcher: Arc<dyn SchemaFetcher>,
    entries: Mutex<HashMap<CacheKey, SchemaState>>,
    /// One lock per in-flight `(session_id, schema_id)` fetch so
    /// concurrent callers await the same request instead of issuing
    /// duplicate upstream calls.
    in_flight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl SchemaStateCache {
    pub fn new(fetcher: Arc<dyn SchemaFetcher>) -> Self {
        Self {
            fetcher,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(
        &self,
        session_id: &SessionId,
        schema: &SchemaDefinition,
        force_refresh: bool,
    ) -> Result<SchemaState> {
        let key: CacheKey = (session_id.clone(), schema.schema_id.clone());
        let now = Utc::now();

        if !force_refresh {
            let entries = self.entries.lock().await;
            if let Some(state) = entries.get(&key) {
                if state.is_fresh(now) {
                    return Ok(state.clone());
                }
            }
        }

        let flight_lock = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let _guard = flight_lock.lock().await;

        // Re-check after acquiring the single-flight lock: another
        // caller may have already refreshed the entry while we waited.
        if !force_refresh {
            let entries = self.entries.lock().await;
            if let Some(state) = entries.get(&key) {
                if state.is_fresh(Utc::now()) {
                    return Ok(state.clone());
                }
            }
        }

        let required_key_names: Vec<String> = schema
            .required_keys()
            .map(|k| k.key_name.clone())
            .collect();

        let fetched = self.fetcher.fetch(schema).await;
        let new_state = match fetched {
            Ok(body) => {
                let keys = derive_key_statuses(schema, &body);
                SchemaState::derive(
                    session_id.clone(),
                    schema.schema_id.clone(),
                    now,
                    now + chrono::Duration::milliseconds(schema.cache_ttl_ms as i64),
                    ApiStatus::Ok,
                    keys,
                    &required_key_names,
                )
            }
            Err(err) => {
                warn!(schema_id = %schema.schema_id, error = %err, "schema fetch failed");
                let prior = self.entries.lock().await.get(&key).cloned();
                match prior {
                    Some(mut stale)
                        if stale.is_within_stale_tolerance(now, schema.stale_tolerance_ms) =>
                    {
                        stale.api_status = ApiStatus::Stale;
                        stale
                    }
                    _ => SchemaState::synthetic_error(
                        session_id.clone(),
                        schema.schema_id.clone(),
                        now,
                        &required_key_names,
                    ),
                }
            }
        };

        self.entries.lock().await.insert(key.clone(), new_state.clone());
        self.in_flight.lock().await.remove(&key);
        Ok(new_state)
    }

    pub async fn invalidate(&self, session_id: &SessionId, schema_id: &SchemaId) {
        self.entries
            .lock()
            .await
            .remove(&(session_id.clone(), schema_id.clone()));
    }
}

fn derive_key_statuses(schema: &SchemaDefinition, body: &serde_json::Value) -> HashMap<String, FetchedKey> {
    schema
        .keys
        .iter()
        .map(|key_def| {
            let value = field_path_value(body, &key_def.api_field_path);
            let status = match &key_def.completion_logic {
                CompletionLogic::NonEmpty { validation_regex } => match &value {
                    None => KeyStatus::None,
                    Some(v) if is_empty_value(v) => KeyStatus::None,
                    Some(v) => {
                        let ok = validation_regex
                            .as_ref()
                            .and_then(|p| Regex::new(p).ok())
                            .map(|re| v.as_str().map(|s| re.is_match(s)).unwrap_or(false))
                            .unwrap_or(true);
                        if ok {
                            KeyStatus::Complete
                        } else {
                            KeyStatus::Incomplete
                        }
                    }
                },
                CompletionLogic::NestedObject { required_subkeys } => match &value {
                    None => KeyStatus::None,
                    Some(v) => {
                        let has_all = required_subkeys
                            .iter()
                            .all(|sk| v.get(sk).map(|sv| !sv.is_null()).unwrap_or(false));
                        if has_all {
                            KeyStatus::Complete
                        } else {
                            KeyStatus::Incomplete
                        }
                    }
                },
                CompletionLogic::ArrayNonEmpty => match &value {
                    None => KeyStatus::None,
                    Some(v) => match v.as_array() {
                        Some(arr) if !arr.is_empty() => KeyStatus::Complete,
                        _ => KeyStatus::Incomplete,
                    },
                },
                CompletionLogic::EnumValue { allowed } => match &value {
                    None => KeyStatus::None,
                    Some(v) => {
                        let matches = v.as_str().map(|s| allowed.iter().any(|a| a == s)).unwrap_or(false);
                        if matches {
                            KeyStatus::Complete
                        } else {
                            KeyStatus::Incomplete
                        }
                    }
                },
            };
            (
                key_def.key_name.clone(),
                FetchedKey {
                    status,
                    value,
                },
            )
        })
        .collect()
}

fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn field_path_value(body: &serde_json::Value, path: &str) -> Option<serde_json::Value> {
    let mut current = body;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current.clone())
}
