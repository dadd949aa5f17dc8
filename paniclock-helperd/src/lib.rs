//! Privileged PanicLock helper.
//!
//! Listens on a Unix socket, admits only the signed controller, and runs the
//! panic sequence on its behalf.

pub mod adapters;
pub mod app;
pub mod config;
pub mod domain;
pub mod listener;
pub mod ports;

use adapters::executor::CommandPrivilegedExecutor;
use app::{CodeSignatureAuthenticator, OperationDispatcher, PanicSequenceEngine};
use paniclock_ipc::ProcessCommandRunner;
use ports::identity::CodeIdentityResolver;
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tracing::info;

pub use config::HelperConfig;
pub use listener::{bind, serve};

pub async fn run(config: HelperConfig) -> anyhow::Result<()> {
    let runner = Arc::new(ProcessCommandRunner::new());
    let executor = Arc::new(CommandPrivilegedExecutor::new(
        runner.clone(),
        config.commands.clone(),
    )?);
    let engine = PanicSequenceEngine::new(executor.clone(), config.sequence_settings());
    let dispatcher = OperationDispatcher::new(executor, engine);
    let authenticator = Arc::new(CodeSignatureAuthenticator::new(
        identity_resolver(&config, runner)?,
        config.trust_requirement(),
    ));

    let listener = bind(&config.socket_path, config.socket_mode)?;
    serve(listener, authenticator, dispatcher, shutdown_signal()).await?;

    if let Err(err) = std::fs::remove_file(&config.socket_path) {
        info!(error = %err, "socket already gone");
    }
    Ok(())
}

#[cfg(target_os = "macos")]
fn identity_resolver(
    config: &HelperConfig,
    runner: Arc<ProcessCommandRunner>,
) -> anyhow::Result<impl CodeIdentityResolver + 'static> {
    Ok(adapters::identity::CodesignIdentityResolver::new(
        runner,
        config.codesign.clone(),
        tokio::runtime::Handle::try_current()?,
    ))
}

#[cfg(not(target_os = "macos"))]
fn identity_resolver(
    config: &HelperConfig,
    _runner: Arc<ProcessCommandRunner>,
) -> anyhow::Result<impl CodeIdentityResolver + 'static> {
    Ok(adapters::identity::ProcfsIdentityResolver::new(&config.proc_root))
}

async fn shutdown_signal() {
    let _ = ctrl_c().await;
    info!("msg" = "shutdown signal received");
}
