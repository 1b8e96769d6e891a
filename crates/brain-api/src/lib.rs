//! Brain API — the HTTP surface over the Turn Pipeline.
//!
//! Exposes turn submission, Dead-Letter Store management, and a health
//! check, with JWT authentication and per-session rate limiting as
//! request-level middleware.

pub mod auth;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod server;

pub use auth::{AuthService, AuthenticatedCaller, Claims};
pub use error::ApiError;
pub use rate_limit::{build_limiter, RateLimitConfig, SessionLimiter};
pub use server::{router, serve, AppState};
