pub mod command;

pub use command::{CommandPrivilegedExecutor, PrimitiveCommands};
