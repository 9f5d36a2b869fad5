use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use rand::Rng;
use tokio::fs;
use tokio::sync::watch;
use tracing::info;
use tracing::warn;

use super::ClusterInstance;
use super::ListenerLauncher;
use super::RoleKind;
use super::RoleLauncher;
use crate::build_role_config;
use crate::find_open_port;
use crate::ConfigOverrideFn;
use crate::HarnessConfig;
use crate::InstancePorts;
use crate::LifecycleError;
use crate::Result;

/// Host every instance binds and every base URL points at.
pub const LOCAL_HOST: &str = "localhost";

/// TLS-enabled bring-up listens on a port fixed by certificate and external
/// config assumptions; it deliberately never consults the allocator.
pub const SECURE_ROUTER_PORT: u16 = 18099;
pub const SECURE_STORAGE_PORT: u16 = 8443;

// The task-runner keeps role-level context in process globals, so at most one
// may run per process no matter how many managers exist.
static TASK_RUNNER_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Starts, stops and restarts instances of the three cluster roles, tracking
/// per-instance ports, identities and on-disk directories.
///
/// Start/stop calls must not be interleaved with use of the cluster by other
/// test threads; the manager is `&mut self` throughout to make that contract
/// visible.
pub struct ClusterManager {
    config: HarnessConfig,
    launcher: Arc<dyn RoleLauncher>,

    routers: Vec<ClusterInstance>,
    storages: Vec<ClusterInstance>,
    task_runner: Option<ClusterInstance>,

    router_base_url: Option<String>,
    router_ports: Vec<u16>,

    router_override: Option<Box<ConfigOverrideFn>>,
    storage_override: Option<Box<ConfigOverrideFn>>,
    task_runner_override: Option<Box<ConfigOverrideFn>>,
}

impl ClusterManager {
    pub fn new(config: HarnessConfig) -> Self {
        Self::with_launcher(config, Arc::new(ListenerLauncher))
    }

    /// Plugs in a different role launcher (the real platform starters, or a
    /// mock).
    pub fn with_launcher(config: HarnessConfig, launcher: Arc<dyn RoleLauncher>) -> Self {
        Self {
            config,
            launcher,
            routers: Vec::new(),
            storages: Vec::new(),
            task_runner: None,
            router_base_url: None,
            router_ports: Vec::new(),
            router_override: None,
            storage_override: None,
            task_runner_override: None,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Test-specific tuning applied to every router configuration right
    /// before start.
    pub fn set_router_override(&mut self, hook: impl Fn(&mut crate::RoleConfig) + Send + Sync + 'static) {
        self.router_override = Some(Box::new(hook));
    }

    pub fn set_storage_override(&mut self, hook: impl Fn(&mut crate::RoleConfig) + Send + Sync + 'static) {
        self.storage_override = Some(Box::new(hook));
    }

    pub fn set_task_runner_override(&mut self, hook: impl Fn(&mut crate::RoleConfig) + Send + Sync + 'static) {
        self.task_runner_override = Some(Box::new(hook));
    }

    // ---------------------------------------------------------- routers

    pub async fn start_router(&mut self) -> Result<()> {
        self.start_routers(1).await
    }

    /// Starts `count` router instances with identities `0..count` and exposes
    /// the base URL of instance 0 plus the full ordered port list.
    pub async fn start_routers(&mut self, count: usize) -> Result<()> {
        self.routers = Vec::with_capacity(count);
        self.router_ports = Vec::with_capacity(count);
        for i in 0..count {
            let instance = self.start_one(RoleKind::Router, i as u32).await?;
            self.router_ports.push(instance.ports().admin);
            self.routers.push(instance);
        }
        if let Some(first) = self.router_ports.first() {
            self.router_base_url = Some(format!("http://{LOCAL_HOST}:{first}"));
        }
        Ok(())
    }

    /// TLS-enabled single-router bring-up on [`SECURE_ROUTER_PORT`].
    ///
    /// Separate code path from [`ClusterManager::start_routers`] on purpose:
    /// the TLS listener port is fixed by certificate assumptions, so the
    /// dynamic-port policy does not apply here.
    pub async fn start_router_secure(&mut self) -> Result<()> {
        let ports = InstancePorts {
            admin: SECURE_ROUTER_PORT,
            data: SECURE_ROUTER_PORT + 1,
            rpc: SECURE_ROUTER_PORT + 2,
        };
        let instance = self
            .start_one_with_ports(RoleKind::Router, 0, ports)
            .await?;
        self.routers = vec![instance];
        self.router_ports = vec![SECURE_ROUTER_PORT];
        self.router_base_url = Some(format!("https://{LOCAL_HOST}:{SECURE_ROUTER_PORT}"));
        Ok(())
    }

    /// Base reachable address built from the first router's port.
    pub fn router_base_url(&self) -> Result<&str> {
        self.router_base_url
            .as_deref()
            .ok_or_else(|| LifecycleError::RoleNotStarted { role: RoleKind::Router }.into())
    }

    pub fn router_port(&self, index: usize) -> Result<u16> {
        self.router_ports
            .get(index)
            .copied()
            .ok_or_else(|| LifecycleError::RoleNotStarted { role: RoleKind::Router }.into())
    }

    /// Full ordered router port list.
    pub fn router_ports(&self) -> &[u16] {
        &self.router_ports
    }

    pub fn random_router_port(&self) -> Result<u16> {
        if self.router_ports.is_empty() {
            return Err(LifecycleError::RoleNotStarted { role: RoleKind::Router }.into());
        }
        let index = rand::thread_rng().gen_range(0..self.router_ports.len());
        Ok(self.router_ports[index])
    }

    pub fn routers(&self) -> &[ClusterInstance] {
        &self.routers
    }

    pub async fn stop_routers(&mut self) -> Result<()> {
        if self.routers.is_empty() {
            return Err(LifecycleError::RoleNotStarted { role: RoleKind::Router }.into());
        }
        for instance in self.routers.drain(..) {
            instance.shutdown().await?;
        }
        self.router_ports.clear();
        self.router_base_url = None;
        info!("all routers stopped");
        Ok(())
    }

    /// Stops every router and starts the same count again reusing identities
    /// `0..count`. Ports are recomputed, never reused from the old set.
    pub async fn restart_routers(&mut self) -> Result<()> {
        if self.routers.is_empty() {
            return Err(LifecycleError::RoleNotStarted { role: RoleKind::Router }.into());
        }
        let count = self.routers.len();
        for instance in self.routers.drain(..) {
            instance.shutdown().await?;
        }
        self.router_ports.clear();
        self.start_routers(count).await
    }

    // ---------------------------------------------------------- storages

    pub async fn start_storage(&mut self) -> Result<()> {
        self.start_storages(1).await
    }

    /// Starts `count` storage instances. Any stale role base directory from a
    /// previous process is removed first so every bring-up starts from a
    /// clean slate.
    pub async fn start_storages(&mut self, count: usize) -> Result<()> {
        remove_dir_if_exists(&self.config.role_base_dir(RoleKind::Storage)).await?;
        self.storages = Vec::with_capacity(count);
        for i in 0..count {
            let instance = self.start_one(RoleKind::Storage, i as u32).await?;
            self.storages.push(instance);
        }
        Ok(())
    }

    /// TLS-enabled single-storage bring-up on [`SECURE_STORAGE_PORT`]; same
    /// fixed-port escape hatch as [`ClusterManager::start_router_secure`].
    pub async fn start_storage_secure(&mut self) -> Result<()> {
        remove_dir_if_exists(&self.config.role_base_dir(RoleKind::Storage)).await?;
        let ports = InstancePorts {
            admin: SECURE_STORAGE_PORT,
            data: SECURE_STORAGE_PORT + 1,
            rpc: SECURE_STORAGE_PORT + 2,
        };
        let instance = self
            .start_one_with_ports(RoleKind::Storage, 0, ports)
            .await?;
        self.storages = vec![instance];
        Ok(())
    }

    pub fn storages(&self) -> &[ClusterInstance] {
        &self.storages
    }

    /// Stops every storage instance and removes the role's base directory so
    /// the next bring-up (which reuses the same per-index paths) starts
    /// clean.
    pub async fn stop_storages(&mut self) -> Result<()> {
        if self.storages.is_empty() {
            return Err(LifecycleError::RoleNotStarted { role: RoleKind::Storage }.into());
        }
        for instance in self.storages.drain(..) {
            instance.shutdown().await?;
        }
        remove_dir_if_exists(&self.config.role_base_dir(RoleKind::Storage)).await?;
        info!("all storages stopped");
        Ok(())
    }

    /// Stops and re-starts the same count of storage instances, reusing
    /// identities `0..count` so directory and port derivation is
    /// reproducible. A real restart: on-disk state is kept.
    pub async fn restart_storages(&mut self) -> Result<()> {
        if self.storages.is_empty() {
            return Err(LifecycleError::RoleNotStarted { role: RoleKind::Storage }.into());
        }
        let count = self.storages.len();
        for instance in self.storages.drain(..) {
            instance.shutdown().await?;
        }
        for i in 0..count {
            let instance = self.start_one(RoleKind::Storage, i as u32).await?;
            self.storages.push(instance);
        }
        Ok(())
    }

    // ---------------------------------------------------------- task runner

    /// Starts the single task-runner instance.
    ///
    /// The singleton guard is checked before any process or network side
    /// effect: a second concurrent task-runner in one process is a
    /// configuration error, not a coexistence scenario.
    pub async fn start_task_runner(&mut self) -> Result<()> {
        if TASK_RUNNER_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(LifecycleError::TaskRunnerAlreadyRunning.into());
        }

        let result = async {
            remove_dir_if_exists(&self.config.role_base_dir(RoleKind::TaskRunner)).await?;
            self.start_one(RoleKind::TaskRunner, 0).await
        }
        .await;

        match result {
            Ok(instance) => {
                self.task_runner = Some(instance);
                Ok(())
            }
            Err(e) => {
                TASK_RUNNER_ACTIVE.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    pub fn task_runner(&self) -> Option<&ClusterInstance> {
        self.task_runner.as_ref()
    }

    /// Stops the task-runner, removes its base directory and releases the
    /// process-wide singleton slot.
    pub async fn stop_task_runner(&mut self) -> Result<()> {
        let instance = self.task_runner.take().ok_or(LifecycleError::RoleNotStarted {
            role: RoleKind::TaskRunner,
        })?;
        let shutdown_result = instance.shutdown().await;
        let cleanup_result =
            remove_dir_if_exists(&self.config.role_base_dir(RoleKind::TaskRunner)).await;
        TASK_RUNNER_ACTIVE.store(false, Ordering::Release);
        shutdown_result?;
        cleanup_result
    }

    // ---------------------------------------------------------- shared

    /// Waits until the admin port of every tracked instance accepts TCP
    /// connections.
    pub async fn wait_for_ready(&self, timeout_secs: u64) -> Result<()> {
        let all = self
            .routers
            .iter()
            .chain(self.storages.iter())
            .chain(self.task_runner.iter());
        for instance in all {
            let addr = format!("127.0.0.1:{}", instance.ports().admin);
            super::wait_until_reachable(&addr, timeout_secs)
                .await
                .map_err(LifecycleError::Io)?;
        }
        Ok(())
    }

    /// Builds configuration for one instance (ports resolved through the
    /// allocator from the role's bases offset by identity), prepares its
    /// directories and launches it.
    async fn start_one(&self, role: RoleKind, instance_id: u32) -> Result<ClusterInstance> {
        let defaults = self.config.role_defaults(role);
        let offset = instance_id as u16;
        let ports = InstancePorts {
            admin: find_open_port(defaults.admin_port_base.saturating_add(offset))?,
            data: find_open_port(defaults.data_port_base.saturating_add(offset))?,
            rpc: find_open_port(defaults.rpc_port_base.saturating_add(offset))?,
        };
        self.start_one_with_ports(role, instance_id, ports).await
    }

    async fn start_one_with_ports(
        &self,
        role: RoleKind,
        instance_id: u32,
        ports: InstancePorts,
    ) -> Result<ClusterInstance> {
        let hook = self.override_for(role);
        let role_config = build_role_config(role, instance_id, &self.config, ports, hook);

        fs::create_dir_all(&role_config.data_dir)
            .await
            .map_err(LifecycleError::Io)?;
        fs::create_dir_all(&role_config.segment_dir)
            .await
            .map_err(LifecycleError::Io)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let join = self.launcher.launch(role_config.clone(), shutdown_rx).await?;
        info!(%role, instance_id, ?ports, "started instance");
        Ok(ClusterInstance::new(role_config, shutdown_tx, join))
    }

    fn override_for(&self, role: RoleKind) -> Option<&ConfigOverrideFn> {
        match role {
            RoleKind::Router => self.router_override.as_deref(),
            RoleKind::Storage => self.storage_override.as_deref(),
            RoleKind::TaskRunner => self.task_runner_override.as_deref(),
        }
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {
            info!(dir = %dir.display(), "removed role directory");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(dir = %dir.display(), "failed to remove role directory: {e}");
            Err(LifecycleError::Io(e).into())
        }
    }
}
