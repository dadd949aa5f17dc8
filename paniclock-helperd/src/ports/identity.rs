use crate::domain::identity::{PeerCredentials, PeerIdentity, TrustRequirement};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("peer process id unavailable")]
    MissingPid,
    #[error("no identity known for pid {0}")]
    Unknown(i32),
    #[error("failed to resolve executable of pid {pid}: {reason}")]
    Executable { pid: i32, reason: String },
    #[error("signature manifest {path} unusable: {reason}")]
    Manifest { path: String, reason: String },
    #[error("signature validation failed: {0}")]
    Validation(String),
}

/// Host facility mapping a connected process to its code-signing identity.
pub trait CodeIdentityResolver: Send + Sync {
    fn resolve(&self, peer: &PeerCredentials) -> Result<PeerIdentity, IdentityError>;

    /// Confirm the resolved code is signed by the required authority and has
    /// not been modified since signing.
    fn check_requirement(
        &self,
        identity: &PeerIdentity,
        requirement: &TrustRequirement,
    ) -> Result<(), IdentityError>;
}

/// Gate every inbound connection passes before any operation is exposed.
pub trait PeerAuthenticator: Send + Sync {
    /// `false` on any lookup failure, mismatch, or validation error.
    fn verify(&self, peer: &PeerCredentials) -> bool;
}
