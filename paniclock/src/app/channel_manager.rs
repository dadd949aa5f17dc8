use crate::domain::channel::{ChannelSnapshot, ChannelState};
use crate::domain::retry::RetryPolicy;
use crate::ports::transport::{Connector, InvalidationHandle, Transport, TransportError};
use chrono::{DateTime, Utc};
use paniclock_ipc::{RemoteOperation, RemoteReply};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("{operation} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        last: TransportError,
    },
    /// The request may already have run on the helper, so it was not resent.
    #[error("{operation} interrupted after it may have reached the helper: {source}")]
    Interrupted {
        operation: &'static str,
        source: TransportError,
    },
    #[error("{operation} rejected by helper: {message}")]
    Protocol {
        operation: &'static str,
        message: String,
    },
}

struct ChannelSlot {
    state: ChannelState,
    generation: u64,
    transport: Option<Box<dyn Transport>>,
    created_at: Option<DateTime<Utc>>,
}

impl ChannelSlot {
    fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            state: self.state,
            generation: self.generation,
            created_at: self.created_at,
        }
    }

    fn is_live(&self) -> bool {
        self.state == ChannelState::Connected && self.transport.is_some()
    }

    fn invalidate(&mut self, reason: &str) {
        if self.transport.is_none() && self.state == ChannelState::Disconnected {
            return;
        }
        self.state = ChannelState::Invalidated;
        info!(generation = self.generation, reason, "channel invalidated");
        self.transport = None;
        self.created_at = None;
        self.state = ChannelState::Disconnected;
    }
}

/// Owns the controller's single link to the helper.
///
/// The slot mutex is shared between the call path and the transport's
/// invalidation callback; calls are serialized through it.
pub struct ChannelManager<C: Connector> {
    connector: C,
    slot: Arc<Mutex<ChannelSlot>>,
}

impl<C: Connector> ChannelManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            slot: Arc::new(Mutex::new(ChannelSlot {
                state: ChannelState::Disconnected,
                generation: 0,
                transport: None,
                created_at: None,
            })),
        }
    }

    pub async fn snapshot(&self) -> ChannelSnapshot {
        self.slot.lock().await.snapshot()
    }

    /// Return the connected channel, establishing it if needed.
    pub async fn get_channel(&self) -> Result<ChannelSnapshot, TransportError> {
        let mut slot = self.slot.lock().await;
        self.ensure_connected(&mut slot).await?;
        Ok(slot.snapshot())
    }

    /// Drop the current transport, if any. The next call reconnects.
    pub async fn invalidate(&self) {
        self.slot.lock().await.invalidate("requested by controller");
    }

    fn invalidation_handle(&self, generation: u64) -> InvalidationHandle {
        let slot = Arc::downgrade(&self.slot);
        InvalidationHandle::new(
            generation,
            Arc::new(move |generation| {
                let Some(slot) = slot.upgrade() else {
                    return;
                };
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    return;
                };
                runtime.spawn(async move {
                    let mut slot = slot.lock().await;
                    if slot.generation == generation {
                        slot.invalidate("transport interrupted");
                    } else {
                        debug!(generation, current = slot.generation, "ignoring stale invalidation");
                    }
                });
            }),
        )
    }

    async fn ensure_connected(&self, slot: &mut ChannelSlot) -> Result<(), TransportError> {
        if slot.is_live() {
            return Ok(());
        }
        slot.generation += 1;
        slot.state = ChannelState::Connecting;
        let handle = self.invalidation_handle(slot.generation);
        match self.connector.connect(handle).await {
            Ok(transport) => {
                slot.transport = Some(transport);
                slot.state = ChannelState::Connected;
                slot.created_at = Some(Utc::now());
                debug!(generation = slot.generation, "channel connected");
                Ok(())
            }
            Err(err) => {
                slot.state = ChannelState::Disconnected;
                Err(err)
            }
        }
    }

    /// One attempt: connect if needed, then call. Transport failures other
    /// than protocol errors invalidate the channel.
    pub async fn invoke_once(&self, operation: RemoteOperation) -> Result<RemoteReply, TransportError> {
        let mut slot = self.slot.lock().await;
        self.ensure_connected(&mut slot).await?;
        let Some(transport) = slot.transport.as_mut() else {
            return Err(TransportError::Unreachable("channel has no transport".into()));
        };
        match transport.call(operation).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                if !matches!(err, TransportError::Protocol(_)) {
                    slot.invalidate("call failed");
                }
                Err(err)
            }
        }
    }

    /// Retry transport failures per `policy`. Replies, including
    /// application-level failures, are returned as soon as one arrives.
    pub async fn invoke_with_retry(
        &self,
        operation: RemoteOperation,
        policy: &RetryPolicy,
    ) -> Result<RemoteReply, ChannelError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.invoke_once(operation).await {
                Ok(reply) => return Ok(reply),
                Err(err) => err,
            };
            if let TransportError::Protocol(message) = err {
                return Err(ChannelError::Protocol {
                    operation: operation.name(),
                    message,
                });
            }
            if err.request_may_have_executed() && !operation.is_idempotent() {
                warn!(%operation, error = %err, "not resending non-idempotent request");
                return Err(ChannelError::Interrupted {
                    operation: operation.name(),
                    source: err,
                });
            }
            if attempt >= policy.max_attempts() {
                warn!(%operation, attempts = attempt, error = %err, "giving up on helper");
                return Err(ChannelError::Exhausted {
                    operation: operation.name(),
                    attempts: attempt,
                    last: err,
                });
            }
            let delay = policy.delay_after(attempt);
            warn!(%operation, attempt, ?delay, error = %err, "helper call failed; retrying");
            tokio::time::sleep(delay).await;
        }
    }
}
