use std::env;
use std::path::PathBuf;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::cluster::RoleKind;
use crate::Error;
use crate::Result;

/// Main configuration container for one harness-managed cluster.
///
/// Combines cluster identity with per-role defaults, with hierarchical
/// override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables with `HARNESS__` prefix (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HarnessConfig {
    /// Logical cluster name shared by every instance
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Address of the external coordination service
    #[serde(default = "default_coordination_address")]
    pub coordination_address: String,

    /// Root of every role's on-disk state; each role owns a subdirectory
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Query-routing role defaults
    #[serde(default = "default_router_defaults")]
    pub router: RoleDefaults,

    /// Data-storage role defaults
    #[serde(default = "default_storage_defaults")]
    pub storage: RoleDefaults,

    /// Background-task role defaults
    #[serde(default = "default_task_runner_defaults")]
    pub task_runner: RoleDefaults,
}

/// Per-role knobs the instance builder derives identity-specific values from.
///
/// Port bases are offset by the instance identity before the allocator
/// resolves them to actually-free ports.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoleDefaults {
    pub admin_port_base: u16,
    pub data_port_base: u16,
    pub rpc_port_base: u16,
    /// Delay between the shutdown signal and task exit; zero for tests
    pub graceful_shutdown_delay_ms: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            coordination_address: default_coordination_address(),
            work_dir: default_work_dir(),
            router: default_router_defaults(),
            storage: default_storage_defaults(),
            task_runner: default_task_runner_defaults(),
        }
    }
}

impl HarnessConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in order (later overrides earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `HARNESS__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred to allow further overrides via
    /// [`HarnessConfig::with_override_config`]. Callers MUST call
    /// [`HarnessConfig::validate`] before using the configuration.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("HARNESS")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from a file, keeping
    /// environment variables as the highest priority. Validation stays
    /// deferred.
    pub fn with_override_config(&self, path: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("HARNESS")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration consistency and returns the validated
    /// instance.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if any configuration rule is
    /// violated.
    pub fn validate(self) -> Result<Self> {
        if self.cluster_name.is_empty() {
            return Err(Error::InvalidConfig("cluster_name cannot be empty".into()));
        }
        if self.coordination_address.is_empty() {
            return Err(Error::InvalidConfig(
                "coordination_address cannot be empty".into(),
            ));
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("work_dir path cannot be empty".into()));
        }
        for (role, defaults) in [
            (RoleKind::Router, &self.router),
            (RoleKind::Storage, &self.storage),
            (RoleKind::TaskRunner, &self.task_runner),
        ] {
            if defaults.admin_port_base == 0 || defaults.data_port_base == 0 || defaults.rpc_port_base == 0 {
                return Err(Error::InvalidConfig(format!(
                    "{role} port bases must be non-zero"
                )));
            }
        }
        Ok(self)
    }

    /// Defaults for one role kind.
    pub fn role_defaults(&self, role: RoleKind) -> &RoleDefaults {
        match role {
            RoleKind::Router => &self.router,
            RoleKind::Storage => &self.storage,
            RoleKind::TaskRunner => &self.task_runner,
        }
    }

    /// Base directory a role's instances live under. Stopping the storage or
    /// task-runner role removes this whole tree.
    pub fn role_base_dir(&self, role: RoleKind) -> PathBuf {
        self.work_dir.join(role.as_str())
    }
}

fn default_cluster_name() -> String {
    "PylonCluster".to_string()
}

fn default_coordination_address() -> String {
    "localhost:2181".to_string()
}

fn default_work_dir() -> PathBuf {
    env::temp_dir().join("pylon-harness")
}

fn default_router_defaults() -> RoleDefaults {
    RoleDefaults {
        admin_port_base: 18099,
        data_port_base: 18200,
        rpc_port_base: 18300,
        graceful_shutdown_delay_ms: 0,
    }
}

fn default_storage_defaults() -> RoleDefaults {
    RoleDefaults {
        admin_port_base: 8097,
        data_port_base: 8098,
        rpc_port_base: 8090,
        graceful_shutdown_delay_ms: 0,
    }
}

fn default_task_runner_defaults() -> RoleDefaults {
    RoleDefaults {
        admin_port_base: 9514,
        data_port_base: 9614,
        rpc_port_base: 9714,
        graceful_shutdown_delay_ms: 0,
    }
}
