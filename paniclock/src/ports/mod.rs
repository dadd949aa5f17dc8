pub mod installer;
pub mod local;
pub mod transport;

pub use installer::{InstallerError, WorkerInstaller};
pub use local::{LocalActions, Notifier, SettingsSource};
pub use transport::{Connector, InvalidationHandle, Transport, TransportError};
