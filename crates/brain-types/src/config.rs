//! Process-wide configuration for the Brain workspace.
//!
//! Mirrors the layered TOML-file + environment-variable pattern used by
//! the rest of the infrastructure: every sub-config has a `Default`, and
//! `from_env` overlays `BRAIN_*` variables onto it.

use crate::error::{BrainError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Top-level configuration for a running Brain process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
    pub streaming: StreamingConfig,
}

/// HTTP server configuration (`brain-api`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_seconds: u64,
}

/// Persistence configuration (`brain-infra::database`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

/// Action Queue & Executor defaults (§4.6). Overridable per action via
/// the action definition's own `retry_policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub default_max_retries: u32,
    pub default_initial_delay_ms: u64,
    pub default_max_delay_ms: u64,
    pub progress_event_interval_ms: u64,
    pub sweeper_poll_interval_ms: u64,
}

/// Schema State Cache defaults (§4.4). Overridable per schema definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub default_ttl_ms: u64,
    pub default_stale_tolerance_ms: u64,
}

/// Streaming Bus and wire window sizes (§4.10, §4.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    pub ring_size: usize,
    pub previous_intents_window: usize,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            queue: QueueConfig::default(),
            cache: CacheConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            request_timeout_seconds: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/brain.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            default_initial_delay_ms: 2_000,
            default_max_delay_ms: 60_000,
            progress_event_interval_ms: 3_000,
            sweeper_poll_interval_ms: 1_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 5 * 60_000,
            default_stale_tolerance_ms: 15 * 60_000,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            ring_size: 20,
            previous_intents_window: 5,
        }
    }
}

impl BrainConfig {
    /// Loads defaults overlaid with `BRAIN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = env::var("BRAIN_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = env::var("BRAIN_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| BrainError::Config("invalid BRAIN_SERVER_PORT".to_string()))?;
        }
        if let Ok(origins) = env::var("BRAIN_SERVER_CORS_ORIGINS") {
            config.server.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Ok(url) = env::var("BRAIN_DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(max_conn) = env::var("BRAIN_DATABASE_MAX_CONNECTIONS") {
            config.database.max_connections = max_conn
                .parse()
                .map_err(|_| BrainError::Config("invalid BRAIN_DATABASE_MAX_CONNECTIONS".to_string()))?;
        }

        if let Ok(max_retries) = env::var("BRAIN_QUEUE_DEFAULT_MAX_RETRIES") {
            config.queue.default_max_retries = max_retries
                .parse()
                .map_err(|_| BrainError::Config("invalid BRAIN_QUEUE_DEFAULT_MAX_RETRIES".to_string()))?;
        }

        if let Ok(ttl) = env::var("BRAIN_CACHE_DEFAULT_TTL_MS") {
            config.cache.default_ttl_ms = ttl
                .parse()
                .map_err(|_| BrainError::Config("invalid BRAIN_CACHE_DEFAULT_TTL_MS".to_string()))?;
        }

        if let Ok(ring) = env::var("BRAIN_STREAMING_RING_SIZE") {
            config.streaming.ring_size = ring
                .parse()
                .map_err(|_| BrainError::Config("invalid BRAIN_STREAMING_RING_SIZE".to_string()))?;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BrainError::Config(format!("failed to read config file: {e}")))?;
        Ok(toml::from_str(&content)?)
    }

    /// Writes configuration to a TOML file.
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| BrainError::Config(format!("failed to write config file: {e}")))?;
        Ok(())
    }

    /// Validates cross-field invariants not expressible via types alone.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(BrainError::Config("database url cannot be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(BrainError::Config("database max_connections must be > 0".to_string()));
        }
        if self.server.port == 0 {
            return Err(BrainError::Config("server port must be > 0".to_string()));
        }
        if self.streaming.ring_size == 0 {
            return Err(BrainError::Config("streaming ring_size must be > 0".to_string()));
        }
        if self.queue.default_max_delay_ms < self.queue.default_initial_delay_ms {
            return Err(BrainError::Config(
                "queue default_max_delay_ms must be >= default_initial_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
