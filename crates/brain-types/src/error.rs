//! Error types shared across the Brain workspace.

use thiserror::Error;

/// The unified error type returned by every Brain crate below the API
/// boundary. Each variant corresponds to one of the error kinds a turn
/// can fail with; `brain-cognitive` maps these onto narrative
/// `instruction_type`s and stable reason identifiers.
#[derive(Error, Debug)]
pub enum BrainError {
    /// Malformed input or failed parameter validation. User-facing, no retry.
    #[error("validation error: {0}")]
    Validation(String),

    /// Action, schema, or workflow definition absent from a registry.
    #[error("not found: {0}")]
    NotFound(String),

    /// The acting user is not eligible for the requested action.
    #[error("eligibility error: {0}")]
    Eligibility(String),

    /// Timeout, network failure, or 5xx from a brand API. Retryable per
    /// the action's retry policy.
    #[error("external transient error: {0}")]
    ExternalTransient(String),

    /// 4xx from a brand API. Not retryable; routed to the DLQ immediately.
    #[error("external permanent error: {0}")]
    ExternalPermanent(String),

    /// Idempotency collision or concurrent modification. Resolved by
    /// adopting the prior outcome rather than surfaced to the user.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A required workflow step failed terminally; triggers rollback
    /// when the workflow declares one.
    #[error("workflow aborted: {0}")]
    WorkflowAbort(String),

    /// Invariant violation or other internal bug. Logged and scoped to
    /// the failing intent; never propagated to abort the whole turn.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Persistence layer error (SQLite / sqlx).
    #[error("database error: {0}")]
    Database(String),

    /// Outbound HTTP call error (brand Schema/Action APIs).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {source}")]
    Serialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Lock acquisition error (per-session lock, single-flight guard).
    #[error("lock error: {0}")]
    Lock(String),

    /// Configuration load/validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication/authorization failure at the API boundary.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl BrainError {
    /// The stable error-kind identifier used in narrative templating and
    /// structured log fields. Matches the kind names in §7 of the
    /// governing specification.
    pub fn kind(&self) -> &'static str {
        match self {
            BrainError::Validation(_) => "validation",
            BrainError::NotFound(_) => "not_found",
            BrainError::Eligibility(_) => "eligibility",
            BrainError::ExternalTransient(_) => "external_transient",
            BrainError::ExternalPermanent(_) => "external_permanent",
            BrainError::Conflict(_) => "conflict",
            BrainError::WorkflowAbort(_) => "workflow_abort",
            BrainError::Internal(_) => "internal",
            BrainError::Io { .. } => "internal",
            BrainError::Database(_) => "internal",
            BrainError::Http(_) => "external_transient",
            BrainError::Serialization { .. } => "internal",
            BrainError::Lock(_) => "internal",
            BrainError::Config(_) => "internal",
            BrainError::Unauthorized(_) => "eligibility",
        }
    }

    /// Whether a Queue Entry should retry after this error, per the
    /// action's `retry_policy.retry_on_errors`. Transient external
    /// failures and internal hiccups are retryable; everything
    /// user-facing or permanent is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrainError::ExternalTransient(_) | BrainError::Http(_))
    }
}

impl From<serde_json::Error> for BrainError {
    fn from(error: serde_json::Error) -> Self {
        BrainError::Serialization {
            source: Box::new(error),
        }
    }
}

impl From<sqlx::Error> for BrainError {
    fn from(error: sqlx::Error) -> Self {
        BrainError::Database(error.to_string())
    }
}

impl From<reqwest::Error> for BrainError {
    fn from(error: reqwest::Error) -> Self {
        BrainError::Http(error.to_string())
    }
}

impl From<toml::de::Error> for BrainError {
    fn from(error: toml::de::Error) -> Self {
        BrainError::Config(error.to_string())
    }
}

impl From<toml::ser::Error> for BrainError {
    fn from(error: toml::ser::Error) -> Self {
        BrainError::Config(error.to_string())
    }
}

/// Result type used throughout the Brain workspace.
pub type Result<T> = std::result::Result<T, BrainError>;
