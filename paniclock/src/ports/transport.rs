use async_trait::async_trait;
use paniclock_ipc::{RemoteOperation, RemoteReply};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No connection could be established.
    #[error("helper unreachable: {0}")]
    Unreachable(String),
    /// The request frame was not fully written, so the helper never saw it.
    #[error("failed to send request: {0}")]
    SendFailed(String),
    /// The request went out but the link died before a reply arrived.
    #[error("connection interrupted: {0}")]
    Interrupted(String),
    /// The helper answered with something other than the expected reply.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn request_may_have_executed(&self) -> bool {
        matches!(self, TransportError::Interrupted(_))
    }
}

/// Lets a transport report that its link died, tagged with the generation
/// it was created for so a stale report cannot tear down a newer link.
#[derive(Clone)]
pub struct InvalidationHandle {
    generation: u64,
    notify: Arc<dyn Fn(u64) + Send + Sync>,
}

impl InvalidationHandle {
    pub fn new(generation: u64, notify: Arc<dyn Fn(u64) + Send + Sync>) -> Self {
        Self { generation, notify }
    }

    /// A handle that reports nowhere.
    pub fn detached() -> Self {
        Self::new(0, Arc::new(|_| {}))
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn invalidate(&self) {
        (self.notify)(self.generation);
    }
}

impl fmt::Debug for InvalidationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationHandle")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// One established link to the helper. Calls are strictly sequential.
#[async_trait]
pub trait Transport: Send {
    async fn call(&mut self, operation: RemoteOperation) -> Result<RemoteReply, TransportError>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        invalidation: InvalidationHandle,
    ) -> Result<Box<dyn Transport>, TransportError>;
}
