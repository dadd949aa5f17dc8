use super::channel_manager::{ChannelError, ChannelManager};
use crate::domain::outcome::ActionOutcome;
use crate::domain::retry::RetryPolicy;
use crate::ports::installer::WorkerInstaller;
use crate::ports::local::{LocalActions, Notifier, SettingsSource};
use crate::ports::transport::Connector;
use anyhow::{anyhow, bail};
use paniclock_ipc::{RemoteOperation, RemoteReply};
use std::sync::Arc;
use tracing::{error, info, warn};

const LOCKED_WITHOUT_HELPER: &str =
    "The helper could not be reached. Your screen is locked, but Touch ID was not disabled.";
const LOCAL_LOCK_FAILED: &str =
    "The helper could not be reached and the screen could not be locked.";

/// Entry points the UI calls. Every result is an [`ActionOutcome`].
pub struct PanicController<C: Connector, I: WorkerInstaller> {
    channels: Arc<ChannelManager<C>>,
    installer: Arc<I>,
    local: Arc<dyn LocalActions>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<dyn SettingsSource>,
    policy: RetryPolicy,
}

impl<C: Connector, I: WorkerInstaller> PanicController<C, I> {
    pub fn new(
        channels: Arc<ChannelManager<C>>,
        installer: Arc<I>,
        local: Arc<dyn LocalActions>,
        notifier: Arc<dyn Notifier>,
        settings: Arc<dyn SettingsSource>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            channels,
            installer,
            local,
            notifier,
            settings,
            policy,
        }
    }

    pub async fn trigger_panic_lock(&self) -> ActionOutcome {
        info!("panic lock triggered");
        let local = self.local.clone();
        tokio::spawn(async move {
            if let Err(err) = local.ensure_immediate_lock().await {
                warn!(error = %err, "could not enforce immediate screen lock");
            }
        });
        if self.settings.confirmation_sound_enabled() {
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                if let Err(err) = notifier.play_confirmation().await {
                    warn!(error = %err, "confirmation sound failed");
                }
            });
        }

        match self
            .channels
            .invoke_with_retry(RemoteOperation::ExecuteSequence, &self.policy)
            .await
        {
            Ok(RemoteReply::ExecuteSequence {
                ok: true, warning, ..
            }) => match warning {
                Some(warning) => {
                    warn!(%warning, "panic sequence completed with warning");
                    ActionOutcome::succeeded_with(warning)
                }
                None => {
                    info!("panic sequence completed");
                    ActionOutcome::succeeded()
                }
            },
            Ok(RemoteReply::ExecuteSequence { ok: false, error, .. }) => {
                let reason = error.unwrap_or_else(|| "helper reported failure".to_string());
                error!(%reason, "panic sequence failed");
                ActionOutcome::failed(reason)
            }
            Ok(other) => ActionOutcome::failed(format!("unexpected reply: {other:?}")),
            Err(err) => self.lock_locally(err).await,
        }
    }

    /// Runs exactly once per trigger when the privileged path is unavailable.
    /// The channel error goes to the log; the outcome carries a fixed sentence.
    async fn lock_locally(&self, cause: ChannelError) -> ActionOutcome {
        warn!(error = %cause, "privileged helper unavailable; locking screen locally");
        match self.local.lock_screen_only().await {
            Ok(()) => ActionOutcome::succeeded_with(LOCKED_WITHOUT_HELPER).degraded(),
            Err(err) => {
                error!(error = %err, cause = %cause, "local screen lock failed");
                ActionOutcome::failed(LOCAL_LOCK_FAILED).degraded()
            }
        }
    }

    pub async fn uninstall_worker(&self) -> ActionOutcome {
        match self.installer.uninstall().await {
            Ok(()) => {
                self.channels.invalidate().await;
                info!("helper and controller uninstalled");
                ActionOutcome::succeeded()
            }
            Err(err) => {
                error!(error = %err, "uninstall failed");
                ActionOutcome::failed(err.to_string())
            }
        }
    }

    pub async fn read_timeout(&self) -> anyhow::Result<u32> {
        match self
            .channels
            .invoke_with_retry(RemoteOperation::ReadTimeout, &self.policy)
            .await?
        {
            RemoteReply::ReadTimeout { error: Some(error), .. } => Err(anyhow!(error)),
            RemoteReply::ReadTimeout { seconds, error: None } => Ok(u32::try_from(seconds)?),
            other => bail!("unexpected reply: {other:?}"),
        }
    }

    pub async fn set_timeout(&self, seconds: u32) -> anyhow::Result<()> {
        match self
            .channels
            .invoke_with_retry(RemoteOperation::SetTimeout { seconds }, &self.policy)
            .await?
        {
            RemoteReply::SetTimeout { ok: true, .. } => Ok(()),
            RemoteReply::SetTimeout { error, .. } => {
                bail!(error.unwrap_or_else(|| "helper reported failure".to_string()))
            }
            other => bail!("unexpected reply: {other:?}"),
        }
    }
}
