pub mod executor;
pub mod identity;

pub use executor::{ExecutorError, PrivilegedExecutor};
pub use identity::{CodeIdentityResolver, IdentityError, PeerAuthenticator};
