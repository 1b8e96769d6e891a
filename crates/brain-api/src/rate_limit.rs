//! Rate Limiting Module
//!
//! Per-session token-bucket limiting for the Turn API, backed by
//! `governor`. Each session gets its own bucket so one noisy
//! conversation can't starve others sharing the process.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

pub type SessionLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

#[derive(Clone)]
pub struct RateLimitConfig {
    pub turns_per_minute: NonZeroU32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            turns_per_minute: NonZeroU32::new(60).unwrap(),
        }
    }
}

pub fn build_limiter(config: &RateLimitConfig) -> Arc<SessionLimiter> {
    Arc::new(RateLimiter::keyed(Quota::per_minute(config.turns_per_minute)))
}

/// Middleware keyed on the `:session_id` path segment — rejects with
/// 429 once a session exceeds its turn-submission quota.
pub async fn limit_by_session(
    State(limiter): State<Arc<SessionLimiter>>,
    Path(session_id): Path<String>,
    request: axum::extract::Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if limiter.check_key(&session_id).is_err() {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_a_sessions_quota() {
        let config = RateLimitConfig {
            turns_per_minute: NonZeroU32::new(1).unwrap(),
        };
        let limiter = build_limiter(&config);
        assert!(limiter.check_key(&"s1".to_string()).is_ok());
        assert!(limiter.check_key(&"s1".to_string()).is_err());
        assert!(limiter.check_key(&"s2".to_string()).is_ok());
    }
}
