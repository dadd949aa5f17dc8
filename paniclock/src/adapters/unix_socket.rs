use crate::ports::transport::{Connector, InvalidationHandle, Transport, TransportError};
use async_trait::async_trait;
use paniclock_ipc::{read_frame, write_frame, RemoteOperation, RemoteReply, ReplyFrame, RequestFrame};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

type ReplySlot = Result<ReplyFrame, String>;

/// How long a call waits for its reply. Only the panic sequence runs long on
/// the helper; everything else answers at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplyTimeouts {
    pub reply: Duration,
    pub sequence: Duration,
}

impl ReplyTimeouts {
    pub fn for_operation(&self, operation: &RemoteOperation) -> Duration {
        match operation {
            RemoteOperation::ExecuteSequence => self.sequence,
            RemoteOperation::Ping
            | RemoteOperation::ReadTimeout
            | RemoteOperation::SetTimeout { .. } => self.reply,
        }
    }
}

#[derive(Clone, Debug)]
pub struct UnixSocketConnector {
    path: PathBuf,
    connect_timeout: Duration,
    timeouts: ReplyTimeouts,
}

impl UnixSocketConnector {
    pub fn new(path: impl Into<PathBuf>, connect_timeout: Duration, timeouts: ReplyTimeouts) -> Self {
        Self {
            path: path.into(),
            connect_timeout,
            timeouts,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Connector for UnixSocketConnector {
    async fn connect(
        &self,
        invalidation: InvalidationHandle,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let stream = timeout(self.connect_timeout, UnixStream::connect(&self.path))
            .await
            .map_err(|_| {
                TransportError::Unreachable(format!(
                    "connecting to {} timed out",
                    self.path.display()
                ))
            })?
            .map_err(|err| TransportError::Unreachable(format!("{}: {err}", self.path.display())))?;
        debug!(path = %self.path.display(), generation = invalidation.generation(), "connected to helper");
        Ok(Box::new(UnixSocketTransport::spawn(
            stream,
            invalidation,
            self.timeouts,
        )))
    }
}

/// Request/reply over one socket. A background reader forwards reply frames
/// and fires the invalidation handle when the helper hangs up.
pub struct UnixSocketTransport {
    writer: OwnedWriteHalf,
    replies: mpsc::Receiver<ReplySlot>,
    reader: JoinHandle<()>,
    next_id: u64,
    timeouts: ReplyTimeouts,
}

impl UnixSocketTransport {
    pub fn spawn(stream: UnixStream, invalidation: InvalidationHandle, timeouts: ReplyTimeouts) -> Self {
        let (read_half, writer) = stream.into_split();
        let (tx, replies) = mpsc::channel(8);
        let reader = tokio::spawn(forward_replies(BufReader::new(read_half), tx, invalidation));
        Self {
            writer,
            replies,
            reader,
            next_id: 0,
            timeouts,
        }
    }
}

impl Drop for UnixSocketTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn forward_replies(
    mut reader: BufReader<OwnedReadHalf>,
    tx: mpsc::Sender<ReplySlot>,
    invalidation: InvalidationHandle,
) {
    loop {
        let slot = match read_frame::<_, ReplyFrame>(&mut reader).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => {
                debug!(generation = invalidation.generation(), "helper closed the connection");
                break;
            }
            Err(err) if err.is_recoverable() => Err(err.to_string()),
            Err(err) => {
                warn!(generation = invalidation.generation(), error = %err, "helper connection failed");
                break;
            }
        };
        if tx.send(slot).await.is_err() {
            // Transport dropped; nobody left to notify.
            return;
        }
    }
    invalidation.invalidate();
}

#[async_trait]
impl Transport for UnixSocketTransport {
    async fn call(&mut self, operation: RemoteOperation) -> Result<RemoteReply, TransportError> {
        self.next_id += 1;
        let id = self.next_id;
        write_frame(&mut self.writer, &RequestFrame { id, operation })
            .await
            .map_err(|err| TransportError::SendFailed(err.to_string()))?;

        let limit = self.timeouts.for_operation(&operation);
        let deadline = Instant::now() + limit;
        loop {
            let slot = timeout_at(deadline, self.replies.recv())
                .await
                .map_err(|_| {
                    TransportError::Interrupted(format!("no reply to {operation} within {limit:?}"))
                })?
                .ok_or_else(|| {
                    TransportError::Interrupted("helper closed the connection".into())
                })?;
            let frame = slot.map_err(TransportError::Protocol)?;
            if frame.id != id && frame.id != paniclock_ipc::protocol::UNKNOWN_REQUEST_ID {
                debug!(expected = id, received = frame.id, "discarding stale reply");
                continue;
            }
            return match frame.reply {
                RemoteReply::ProtocolError { message } => Err(TransportError::Protocol(message)),
                reply if reply.answers(&operation) => Ok(reply),
                other => Err(TransportError::Protocol(format!(
                    "unexpected reply to {operation}: {other:?}"
                ))),
            };
        }
    }
}
