pub mod executor;
pub mod identity;

pub use executor::{CommandPrivilegedExecutor, PrimitiveCommands};
pub use identity::{
    CodesignCommands, CodesignIdentityResolver, ProcfsIdentityResolver, SignatureManifest,
    StaticIdentityTable,
};
