use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to execute {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("{program} failed with status {status}: {output}")]
    Exit {
        program: String,
        status: String,
        output: String,
    },
    #[error("failed to parse biometric timeout from: {0}")]
    Parse(String),
    #[error("lock failed: {preferred}; fallback failed: {fallback}")]
    LockUnavailable { preferred: String, fallback: String },
}

/// The three root-only primitives the helper wraps.
///
/// Each call runs to completion before returning. `read_timeout` and
/// `set_timeout` are safe to repeat; `trigger_lock` is not retried by callers
/// because a repeat re-shows the lock screen.
#[async_trait]
pub trait PrivilegedExecutor: Send + Sync {
    async fn read_timeout(&self) -> Result<u32, ExecutorError>;

    async fn set_timeout(&self, seconds: u32) -> Result<(), ExecutorError>;

    async fn trigger_lock(&self) -> Result<(), ExecutorError>;
}
