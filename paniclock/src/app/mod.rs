pub mod channel_manager;
pub mod controller;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use channel_manager::{ChannelError, ChannelManager};
pub use controller::PanicController;
pub use supervisor::LifecycleSupervisor;
