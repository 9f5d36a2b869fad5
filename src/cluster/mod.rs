//! Cluster roles, instance bookkeeping and lifecycle management.
//!
//! A cluster managed here is made of three role kinds. Instances are started
//! through a [`RoleLauncher`] seam so the real platform starters (external
//! collaborators) stay out of this crate; the built-in [`ListenerLauncher`]
//! stands in for them during harness self-tests.

mod launcher;
mod lifecycle;

pub use launcher::*;
pub use lifecycle::*;


use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;
use tracing::warn;

use crate::InstancePorts;
use crate::LifecycleError;
use crate::Result;
use crate::RoleConfig;

/// One of the three kinds of cluster process managed by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoleKind {
    /// Query-routing role
    Router,
    /// Data-storage role
    Storage,
    /// Background-task role (singleton per process)
    TaskRunner,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Router => "router",
            RoleKind::Storage => "storage",
            RoleKind::TaskRunner => "task-runner",
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one instance object. `Stopped` is terminal: a restart always
/// destroys the old record and constructs a fresh one with the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Uninitialized,
    Configuring,
    Running,
    Stopped,
}

/// One running process of a given role.
///
/// Owned exclusively by [`ClusterManager`]: created on start, removed from
/// tracking on stop. Shutdown follows the watch-channel pattern: signal the
/// sender, then await the instance task.
#[derive(Debug)]
pub struct ClusterInstance {
    config: RoleConfig,
    state: InstanceState,
    shutdown_tx: watch::Sender<()>,
    join: JoinHandle<Result<()>>,
}

impl ClusterInstance {
    pub(crate) fn new(
        config: RoleConfig,
        shutdown_tx: watch::Sender<()>,
        join: JoinHandle<Result<()>>,
    ) -> Self {
        Self {
            config,
            state: InstanceState::Running,
            shutdown_tx,
            join,
        }
    }

    pub fn role(&self) -> RoleKind {
        self.config.role
    }

    /// 0-based index within this instance's role.
    pub fn instance_id(&self) -> u32 {
        self.config.instance_id
    }

    pub fn ports(&self) -> InstancePorts {
        self.config.ports
    }

    pub fn config(&self) -> &RoleConfig {
        &self.config
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Signals shutdown and waits for the instance task to exit. Consumes the
    /// instance: `Stopped` is terminal.
    pub(crate) async fn shutdown(mut self) -> Result<()> {
        self.state = InstanceState::Stopped;
        let role = self.config.role;
        let instance_id = self.config.instance_id;
        debug!(%role, instance_id, "shutting down instance");

        self.shutdown_tx
            .send(())
            .map_err(|_| LifecycleError::ShutdownSignal { role, instance_id })?;
        self.join.await.map_err(LifecycleError::TaskFailed)??;
        Ok(())
    }
}

/// Polls `peer_addr` until a TCP connect succeeds or `timeout_secs` elapses.
pub async fn wait_until_reachable(peer_addr: &str, timeout_secs: u64) -> std::io::Result<()> {
    let timeout_duration = Duration::from_secs(timeout_secs);
    let retry_interval = Duration::from_millis(100);

    let result = time::timeout(timeout_duration, async {
        loop {
            if TcpStream::connect(peer_addr).await.is_ok() {
                debug!(peer_addr, "instance is reachable");
                return;
            }
            warn!(peer_addr, "instance not reachable yet, retrying");
            time::sleep(retry_interval).await;
        }
    })
    .await;

    result.map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("Instance ({peer_addr}) did not become reachable within {timeout_secs} seconds"),
        )
    })
}
