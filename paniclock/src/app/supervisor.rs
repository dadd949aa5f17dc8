use super::channel_manager::ChannelManager;
use crate::domain::outcome::WorkerReadiness;
use crate::domain::retry::RetryPolicy;
use crate::ports::installer::WorkerInstaller;
use crate::ports::transport::Connector;
use paniclock_ipc::{RemoteOperation, RemoteReply};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Installs the helper when missing and reinstalls it when it stops
/// answering pings.
pub struct LifecycleSupervisor<I: WorkerInstaller, C: Connector> {
    installer: Arc<I>,
    channels: Arc<ChannelManager<C>>,
    liveness: RetryPolicy,
}

impl<I: WorkerInstaller, C: Connector> LifecycleSupervisor<I, C> {
    pub fn new(installer: Arc<I>, channels: Arc<ChannelManager<C>>, liveness: RetryPolicy) -> Self {
        Self {
            installer,
            channels,
            liveness,
        }
    }

    /// Never fails: install problems are logged and reported in the result.
    pub async fn ensure_worker_ready(&self) -> WorkerReadiness {
        if !self.installer.is_installed().await {
            info!("helper not installed; installing");
            return match self.install().await {
                Ok(()) => WorkerReadiness::Installed,
                Err(reason) => WorkerReadiness::InstallFailed(reason),
            };
        }
        if self.ping_with_retry().await {
            return WorkerReadiness::Responsive;
        }
        warn!(
            attempts = self.liveness.max_attempts(),
            "helper installed but unresponsive; reinstalling"
        );
        match self.install().await {
            Ok(()) => WorkerReadiness::Reinstalled,
            Err(reason) => WorkerReadiness::InstallFailed(reason),
        }
    }

    /// Ping up to the liveness budget. A dead or unexpected reply counts as
    /// a failed attempt just like a transport failure.
    pub async fn ping_with_retry(&self) -> bool {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.channels.invoke_once(RemoteOperation::Ping).await {
                Ok(RemoteReply::Ping { alive: true }) => return true,
                Ok(RemoteReply::Ping { alive: false }) => {
                    warn!(attempt, "helper reports it is not alive");
                }
                Ok(other) => warn!(attempt, reply = ?other, "unexpected ping reply"),
                Err(err) => warn!(attempt, error = %err, "helper did not answer ping"),
            }
            if attempt >= self.liveness.max_attempts() {
                return false;
            }
            tokio::time::sleep(self.liveness.delay_after(attempt)).await;
        }
    }

    async fn install(&self) -> Result<(), String> {
        match self.installer.install().await {
            Ok(()) => {
                // Whatever link existed pointed at the previous helper.
                self.channels.invalidate().await;
                info!("helper installed");
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "helper installation failed");
                Err(err.to_string())
            }
        }
    }
}
