//! Identifiers used across the Brain workspace.
//!
//! Per the data model, all identifiers are opaque strings unless a
//! narrower type is called for. External, caller-supplied identifiers
//! (sessions, tenants, registry keys) are thin string newtypes; internal
//! identifiers minted by the Brain itself (queue entries, executions,
//! DLQ entries, workflow instances, intents, active tasks) wrap a
//! `Uuid` so `new()` always produces a fresh one.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

string_id!(BrandId, "A tenant (brand) identifier. Scopes all definitions and data.");
string_id!(InstanceId, "A channel/deployment identifier within a brand.");
string_id!(SessionId, "A conversation session identifier, owned by the message handler.");
string_id!(ActionId, "An Action Definition's registry key, unique within an instance.");
string_id!(SchemaId, "A Schema Definition's registry key, unique within a brand.");
string_id!(WorkflowId, "A Workflow Definition's registry key.");

uuid_id!(IntentId, "An Intent Ledger Entry identifier, minted on intent receipt.");
uuid_id!(TaskId, "An Active Task identifier, minted when an action begins.");
uuid_id!(QueueId, "A Queue Entry identifier, minted on enqueue.");
uuid_id!(ExecutionId, "An Execution Log Entry identifier, minted per attempt.");
uuid_id!(DlqId, "A Dead-Letter Store entry identifier.");
uuid_id!(WorkflowInstanceId, "A Workflow Instance identifier, minted on instantiation.");

/// Deterministic idempotency key for a queue entry, derived from
/// `(session_id, action_id, canonical_params)` per §4.1 step F.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(pub String);

impl IdempotencyKey {
    /// Computes the deterministic key. `canonical_params` must already be
    /// in a stable serialization (sorted keys) so identical logical
    /// params always hash the same.
    pub fn compute(session_id: &SessionId, action_id: &ActionId, canonical_params: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(action_id.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(canonical_params.as_bytes());
        let digest = hasher.finalize();
        Self(format!("{:x}", digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns the current UTC timestamp with millisecond precision, as
/// required by the data model.
pub fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
