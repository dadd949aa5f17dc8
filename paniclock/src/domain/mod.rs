pub mod channel;
pub mod outcome;
pub mod retry;

pub use channel::{ChannelSnapshot, ChannelState};
pub use outcome::{ActionOutcome, WorkerReadiness};
pub use retry::RetryPolicy;
