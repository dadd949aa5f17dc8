//! Wire contract between the controller and the helper.
//!
//! Every request is a single line `{"id":<u64>,"op":"<operation>",...}` and is
//! answered by exactly one line `{"id":<u64>,"reply":{"kind":"<operation>",...}}`.
//! Frames larger than [`MAX_FRAME_BYTES`] terminate the connection.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum size of a single frame, newline excluded.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Id used when replying to a frame whose id could not be read.
pub const UNKNOWN_REQUEST_ID: u64 = 0;

/// The closed set of operations the helper exposes to an authenticated peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RemoteOperation {
    Ping,
    ReadTimeout,
    SetTimeout { seconds: u32 },
    ExecuteSequence,
}

impl RemoteOperation {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteOperation::Ping => "ping",
            RemoteOperation::ReadTimeout => "read_timeout",
            RemoteOperation::SetTimeout { .. } => "set_timeout",
            RemoteOperation::ExecuteSequence => "execute_sequence",
        }
    }

    /// Whether re-sending the operation after a lost reply is harmless.
    ///
    /// `ExecuteSequence` triggers the lock screen, so a second delivery is
    /// visible to the user.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, RemoteOperation::ExecuteSequence)
    }
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOperation::SetTimeout { seconds } => write!(f, "set_timeout({seconds})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Typed reply for each [`RemoteOperation`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteReply {
    Ping {
        alive: bool,
    },
    /// `seconds` is `-1` when the read failed; `error` then carries the reason.
    ReadTimeout {
        seconds: i64,
        #[serde(default)]
        error: Option<String>,
    },
    SetTimeout {
        ok: bool,
        #[serde(default)]
        error: Option<String>,
    },
    ExecuteSequence {
        ok: bool,
        #[serde(default)]
        error: Option<String>,
        /// Set when the sequence completed but the original timeout could not
        /// be restored.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
    /// The request frame could not be understood.
    ProtocolError {
        message: String,
    },
}

impl RemoteReply {
    pub fn read_failed(error: impl Into<String>) -> Self {
        RemoteReply::ReadTimeout {
            seconds: -1,
            error: Some(error.into()),
        }
    }

    /// Whether this reply is the answer shape expected for `operation`.
    pub fn answers(&self, operation: &RemoteOperation) -> bool {
        matches!(
            (self, operation),
            (RemoteReply::Ping { .. }, RemoteOperation::Ping)
                | (RemoteReply::ReadTimeout { .. }, RemoteOperation::ReadTimeout)
                | (RemoteReply::SetTimeout { .. }, RemoteOperation::SetTimeout { .. })
                | (
                    RemoteReply::ExecuteSequence { .. },
                    RemoteOperation::ExecuteSequence
                )
        )
    }

    /// The operation ran on the helper but reported failure.
    pub fn is_application_failure(&self) -> bool {
        match self {
            RemoteReply::Ping { alive } => !alive,
            RemoteReply::ReadTimeout { error, .. } => error.is_some(),
            RemoteReply::SetTimeout { ok, .. } | RemoteReply::ExecuteSequence { ok, .. } => !ok,
            RemoteReply::ProtocolError { .. } => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    #[serde(flatten)]
    pub operation: RemoteOperation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub id: u64,
    pub reply: RemoteReply,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("frame exceeds {limit} bytes")]
    Oversize { limit: usize },
    #[error("connection closed mid-frame")]
    Truncated,
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Whether the stream is still positioned on a frame boundary.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtocolError::Malformed(_))
    }
}

/// Read one newline-terminated frame.
///
/// Returns `Ok(None)` on a clean end of stream. Blank lines are skipped.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    loop {
        let mut buf = Vec::new();
        let read = (&mut *reader)
            .take(MAX_FRAME_BYTES as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if buf.last() != Some(&b'\n') {
            if buf.len() > MAX_FRAME_BYTES {
                return Err(ProtocolError::Oversize {
                    limit: MAX_FRAME_BYTES,
                });
            }
            return Err(ProtocolError::Truncated);
        }
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        if buf.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        return Ok(Some(serde_json::from_slice(&buf)?));
    }
}

/// Write one frame followed by a newline and flush.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
