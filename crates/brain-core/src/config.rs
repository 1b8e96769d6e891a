//! Per-instance configuration (§6): `popular_actions` plus the registry
//! references scoping an instance to its brand. Unlike the process-wide
//! `brain_types::BrainConfig`, this is tenant data, reloaded alongside
//! the Action/Schema Registries rather than read once at startup.

use brain_types::{BrandId, InstanceId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub brand_id: BrandId,
    pub instance_id: InstanceId,
    /// Configuration-sourced, per the §9 open-question resolution:
    /// `popular_actions` is not session-dependent.
    pub popular_actions: Vec<String>,
}
