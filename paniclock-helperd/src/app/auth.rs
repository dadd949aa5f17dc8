use crate::domain::identity::{PeerCredentials, TrustRequirement};
use crate::ports::identity::{CodeIdentityResolver, PeerAuthenticator};
use tracing::{info, warn};

/// Admits a peer only when its resolved identity satisfies the trust
/// requirement. Every decision is logged for audit; nothing is cached.
pub struct CodeSignatureAuthenticator<R: CodeIdentityResolver> {
    resolver: R,
    requirement: TrustRequirement,
}

impl<R: CodeIdentityResolver> CodeSignatureAuthenticator<R> {
    pub fn new(resolver: R, requirement: TrustRequirement) -> Self {
        Self {
            resolver,
            requirement,
        }
    }

    pub fn requirement(&self) -> &TrustRequirement {
        &self.requirement
    }
}

impl<R: CodeIdentityResolver> PeerAuthenticator for CodeSignatureAuthenticator<R> {
    fn verify(&self, peer: &PeerCredentials) -> bool {
        let identity = match self.resolver.resolve(peer) {
            Ok(identity) => identity,
            Err(err) => {
                warn!(pid = ?peer.pid, uid = peer.uid, error = %err, "peer rejected: identity lookup failed");
                return false;
            }
        };
        if !self.requirement.matches(&identity) {
            warn!(
                pid = identity.process_id,
                uid = peer.uid,
                application_id = %identity.application_id,
                signing_authority_id = %identity.signing_authority_id,
                "peer rejected: identity does not match requirement"
            );
            return false;
        }
        match self.resolver.check_requirement(&identity, &self.requirement) {
            Ok(()) => {
                info!(
                    pid = identity.process_id,
                    uid = peer.uid,
                    application_id = %identity.application_id,
                    signing_authority_id = %identity.signing_authority_id,
                    "peer accepted"
                );
                true
            }
            Err(err) => {
                warn!(
                    pid = identity.process_id,
                    uid = peer.uid,
                    application_id = %identity.application_id,
                    signing_authority_id = %identity.signing_authority_id,
                    error = %err,
                    "peer rejected"
                );
                false
            }
        }
    }
}
