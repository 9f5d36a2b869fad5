use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::HarnessConfig;
use crate::cluster::RoleKind;

/// Network ports assigned to one instance.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct InstancePorts {
    /// Externally reachable port (query endpoint for routers, admin API
    /// otherwise)
    pub admin: u16,
    /// Data-plane port
    pub data: u16,
    /// Internal RPC port
    pub rpc: u16,
}

/// Final configuration handed to a role launcher for one instance.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoleConfig {
    pub role: RoleKind,
    /// 0-based index within the role
    pub instance_id: u32,
    pub cluster_name: String,
    pub coordination_address: String,
    pub ports: InstancePorts,
    /// Role base directory (shared across the role's instances)
    pub base_dir: PathBuf,
    /// Per-instance working data directory (`base_dir/data-<id>`)
    pub data_dir: PathBuf,
    /// Per-instance segment staging directory (`base_dir/segments-<id>`)
    pub segment_dir: PathBuf,
    pub graceful_shutdown_delay_ms: u64,
}

/// Caller-supplied hook that mutates the final configuration before start.
pub type ConfigOverrideFn = dyn Fn(&mut RoleConfig) + Send + Sync;

/// Assembles the configuration for one instance of a role.
///
/// Pure merge of role defaults, mandatory cluster-identity fields and
/// identity-derived fields (directories suffixed by index, caller-resolved
/// ports), finished by the optional override hook. Deterministic given
/// identical inputs; the defaults inside `harness` may themselves have come
/// from environment or disk.
pub fn build_role_config(
    role: RoleKind,
    instance_id: u32,
    harness: &HarnessConfig,
    ports: InstancePorts,
    override_hook: Option<&ConfigOverrideFn>,
) -> RoleConfig {
    let defaults = harness.role_defaults(role);
    let base_dir = harness.role_base_dir(role);

    let mut config = RoleConfig {
        role,
        instance_id,
        cluster_name: harness.cluster_name.clone(),
        coordination_address: harness.coordination_address.clone(),
        ports,
        data_dir: base_dir.join(format!("data-{instance_id}")),
        segment_dir: base_dir.join(format!("segments-{instance_id}")),
        base_dir,
        graceful_shutdown_delay_ms: defaults.graceful_shutdown_delay_ms,
    };

    if let Some(hook) = override_hook {
        hook(&mut config);
    }
    config
}
