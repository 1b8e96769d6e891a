//! Shared types used across every Brain crate: the unified error enum,
//! identifier newtypes, and process configuration. No async, no I/O
//! beyond reading/writing a config file.

pub mod config;
pub mod error;
pub mod ids;

pub use config::*;
pub use error::*;
pub use ids::*;
