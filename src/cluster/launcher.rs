use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::LifecycleError;
use crate::Result;
use crate::RoleConfig;

/// Seam to the real platform starters.
///
/// A launcher receives the fully built per-instance configuration and a
/// shutdown receiver, brings the process up (bounded by the underlying
/// service's own startup time, not retried here) and returns the handle of
/// the task that runs it. A failure to launch is fatal to the bring-up
/// attempt.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RoleLauncher: Send + Sync + 'static {
    async fn launch(
        &self,
        config: RoleConfig,
        shutdown: watch::Receiver<()>,
    ) -> Result<JoinHandle<Result<()>>>;
}

/// Built-in launcher that holds the instance's admin port open until the
/// shutdown signal arrives.
///
/// Stands in for the real role starters in harness self-tests: readiness
/// probes and port-collision behavior are observable without the platform
/// binaries.
pub struct ListenerLauncher;

#[async_trait]
impl RoleLauncher for ListenerLauncher {
    async fn launch(
        &self,
        config: RoleConfig,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<JoinHandle<Result<()>>> {
        let role = config.role;
        let instance_id = config.instance_id;
        let admin_port = config.ports.admin;

        let listener = TcpListener::bind(("127.0.0.1", admin_port))
            .await
            .map_err(|e| LifecycleError::StartFailed {
                role,
                instance_id,
                reason: e.to_string(),
            })?;
        info!(%role, instance_id, admin_port, "instance listening");

        let delay = Duration::from_millis(config.graceful_shutdown_delay_ms);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        debug!(%role, instance_id, "shutdown signal received");
                        break;
                    }
                    accepted = listener.accept() => {
                        if let Err(e) = accepted {
                            error!(%role, instance_id, "accept failed: {e}");
                            break;
                        }
                    }
                }
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            debug!(%role, instance_id, "instance task exiting");
            Ok(())
        });

        Ok(handle)
    }
}
