pub mod auth;
pub mod dispatcher;
pub mod sequence;

pub use auth::CodeSignatureAuthenticator;
pub use dispatcher::OperationDispatcher;
pub use sequence::{PanicSequenceEngine, SequenceError, SequenceReport};
