pub mod installer;
pub mod local;
pub mod unix_socket;

pub use installer::{CommandWorkerInstaller, Elevation, InstallerConfig};
pub use local::{CommandLocalActions, CommandNotifier, LocalCommands, StaticSettings};
pub use unix_socket::{ReplyTimeouts, UnixSocketConnector, UnixSocketTransport};
