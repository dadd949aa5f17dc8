use super::sequence::PanicSequenceEngine;
use crate::ports::executor::PrivilegedExecutor;
use paniclock_ipc::{RemoteOperation, RemoteReply};
use std::sync::Arc;
use tracing::{debug, error};

/// Maps each authenticated request onto the executor or the sequence engine.
pub struct OperationDispatcher<E: PrivilegedExecutor> {
    executor: Arc<E>,
    engine: PanicSequenceEngine<E>,
}

impl<E: PrivilegedExecutor> Clone for OperationDispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            engine: self.engine.clone(),
        }
    }
}

impl<E: PrivilegedExecutor + 'static> OperationDispatcher<E> {
    pub fn new(executor: Arc<E>, engine: PanicSequenceEngine<E>) -> Self {
        Self { executor, engine }
    }

    pub fn engine(&self) -> &PanicSequenceEngine<E> {
        &self.engine
    }

    pub async fn dispatch(&self, operation: RemoteOperation) -> RemoteReply {
        debug!(%operation, "dispatching");
        match operation {
            RemoteOperation::Ping => RemoteReply::Ping { alive: true },
            RemoteOperation::ReadTimeout => match self.executor.read_timeout().await {
                Ok(seconds) => RemoteReply::ReadTimeout {
                    seconds: i64::from(seconds),
                    error: None,
                },
                Err(err) => RemoteReply::read_failed(err.to_string()),
            },
            RemoteOperation::SetTimeout { seconds } => {
                match self.executor.set_timeout(seconds).await {
                    Ok(()) => RemoteReply::SetTimeout {
                        ok: true,
                        error: None,
                    },
                    Err(err) => RemoteReply::SetTimeout {
                        ok: false,
                        error: Some(err.to_string()),
                    },
                }
            }
            RemoteOperation::ExecuteSequence => self.execute_sequence().await,
        }
    }

    /// The run is detached from the connection so a vanished requester
    /// cannot interrupt it before the timeout is restored.
    async fn execute_sequence(&self) -> RemoteReply {
        let engine = self.engine.clone();
        let handle = tokio::spawn(async move { engine.execute().await });
        match handle.await {
            Ok(Ok(report)) => RemoteReply::ExecuteSequence {
                ok: true,
                error: None,
                warning: report.warning(),
            },
            Ok(Err(err)) => RemoteReply::ExecuteSequence {
                ok: false,
                error: Some(err.to_string()),
                warning: None,
            },
            Err(join) => {
                error!(error = %join, "panic sequence task aborted");
                RemoteReply::ExecuteSequence {
                    ok: false,
                    error: Some(format!("sequence task aborted: {join}")),
                    warning: None,
                }
            }
        }
    }
}
