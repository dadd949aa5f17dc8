//! PanicLock controller.
//!
//! Keeps one channel to the privileged helper, installs or repairs the
//! helper when needed, and turns a panic trigger into either the full
//! privileged sequence or a local screen lock.

pub mod adapters;
pub mod app;
pub mod config;
pub mod domain;
pub mod ports;

use adapters::{
    CommandLocalActions, CommandNotifier, CommandWorkerInstaller, StaticSettings,
    UnixSocketConnector,
};
use app::{ChannelManager, LifecycleSupervisor, PanicController};
use paniclock_ipc::ProcessCommandRunner;
use std::sync::Arc;
use std::time::Duration;

pub use config::ControllerConfig;
pub use domain::{ActionOutcome, WorkerReadiness};

/// Authorization prompts wait on the user.
const INSTALLER_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

pub type SystemInstaller = CommandWorkerInstaller<ProcessCommandRunner>;

/// The controller's services wired to the real socket and host commands.
pub struct PanicLock {
    pub channels: Arc<ChannelManager<UnixSocketConnector>>,
    pub controller: PanicController<UnixSocketConnector, SystemInstaller>,
    pub supervisor: LifecycleSupervisor<SystemInstaller, UnixSocketConnector>,
}

impl PanicLock {
    pub fn from_config(config: &ControllerConfig) -> Self {
        let runner = Arc::new(ProcessCommandRunner::new());
        let installer = Arc::new(CommandWorkerInstaller::new(
            Arc::new(ProcessCommandRunner::with_timeout(INSTALLER_COMMAND_TIMEOUT)),
            config.installer.clone(),
        ));
        let channels = Arc::new(ChannelManager::new(UnixSocketConnector::new(
            &config.socket_path,
            config.connect_timeout(),
            config.reply_timeouts(),
        )));

        let controller = PanicController::new(
            channels.clone(),
            installer.clone(),
            Arc::new(CommandLocalActions::new(runner.clone(), config.local.clone())),
            Arc::new(CommandNotifier::new(
                runner,
                config.local.confirmation_sound.clone(),
            )),
            Arc::new(StaticSettings {
                confirmation_sound: config.confirmation_sound,
            }),
            config.channel_retry.policy(),
        );
        let supervisor =
            LifecycleSupervisor::new(installer, channels.clone(), config.liveness_retry.policy());

        Self {
            channels,
            controller,
            supervisor,
        }
    }
}
