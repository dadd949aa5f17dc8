//! Shared plumbing for the PanicLock controller and its privileged helper.
//!
//! Transport: Unix domain socket, NDJSON frames (one JSON object per line).

pub mod defaults;
pub mod exec;
pub mod identifiers;
pub mod protocol;

pub use exec::{CommandOutput, CommandRunner, CommandSpec, ProcessCommandRunner};
pub use protocol::{
    read_frame, write_frame, ProtocolError, RemoteOperation, RemoteReply, ReplyFrame,
    RequestFrame, MAX_FRAME_BYTES,
};
