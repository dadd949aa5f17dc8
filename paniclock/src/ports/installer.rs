use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InstallerError {
    #[error("authorization denied: {0}")]
    Unauthorized(String),
    #[error("could not run installer: {0}")]
    Spawn(String),
    /// One or more steps failed; the message lists every failed step.
    #[error("{0}")]
    Failed(String),
}

/// Registers and removes the privileged helper with the host service manager.
/// Both directions may prompt the user for authorization.
#[async_trait]
pub trait WorkerInstaller: Send + Sync {
    async fn is_installed(&self) -> bool;

    async fn install(&self) -> Result<(), InstallerError>;

    /// Deregister the helper, delete its artifacts and remove the controller
    /// installation in one privileged batch.
    async fn uninstall(&self) -> Result<(), InstallerError>;
}
