pub mod codesign;
pub mod procfs;
pub mod static_table;

pub use codesign::{CodesignCommands, CodesignIdentityResolver};
pub use procfs::{ProcfsIdentityResolver, SignatureManifest};
pub use static_table::StaticIdentityTable;
