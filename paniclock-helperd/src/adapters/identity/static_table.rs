use crate::domain::identity::{
    ApplicationId, PeerCredentials, PeerIdentity, SigningAuthorityId, TrustRequirement,
};
use crate::ports::identity::{CodeIdentityResolver, IdentityError};
use std::collections::{HashMap, HashSet};

/// Fixed pid to identity mapping. Used by tests and by hosts where identity
/// is provisioned out of band.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentityTable {
    entries: HashMap<i32, PeerIdentity>,
    invalid_signatures: HashSet<i32>,
}

impl StaticIdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(
        mut self,
        pid: i32,
        application_id: ApplicationId,
        signing_authority_id: SigningAuthorityId,
    ) -> Self {
        self.entries.insert(
            pid,
            PeerIdentity::new(pid, application_id, signing_authority_id),
        );
        self
    }

    /// Resolve `pid` normally but fail its signature check.
    pub fn with_invalid_signature(mut self, pid: i32) -> Self {
        self.invalid_signatures.insert(pid);
        self
    }
}

impl CodeIdentityResolver for StaticIdentityTable {
    fn resolve(&self, peer: &PeerCredentials) -> Result<PeerIdentity, IdentityError> {
        let pid = peer.pid.ok_or(IdentityError::MissingPid)?;
        self.entries
            .get(&pid)
            .cloned()
            .ok_or(IdentityError::Unknown(pid))
    }

    fn check_requirement(
        &self,
        identity: &PeerIdentity,
        requirement: &TrustRequirement,
    ) -> Result<(), IdentityError> {
        if self.invalid_signatures.contains(&identity.process_id) {
            return Err(IdentityError::Validation(format!(
                "signature of pid {} is invalid",
                identity.process_id
            )));
        }
        if !requirement.matches(identity) {
            return Err(IdentityError::Validation(format!(
                "identity {}/{} does not satisfy requirement",
                identity.application_id, identity.signing_authority_id
            )));
        }
        Ok(())
    }
}
