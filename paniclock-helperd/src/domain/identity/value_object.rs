use paniclock_ipc::identifiers::{CONTROLLER_APPLICATION_ID, SIGNING_AUTHORITY_ID};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use subtle::ConstantTimeEq;

/// Credentials the kernel reports for the process on the other end of a socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerCredentials {
    pub pid: Option<i32>,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn new(value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err("application id cannot be empty".into());
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ApplicationId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ApplicationId> for String {
    fn from(value: ApplicationId) -> Self {
        value.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SigningAuthorityId(String);

impl SigningAuthorityId {
    pub fn new(value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err("signing authority id cannot be empty".into());
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SigningAuthorityId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SigningAuthorityId> for String {
    fn from(value: SigningAuthorityId) -> Self {
        value.0
    }
}

impl fmt::Display for SigningAuthorityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk evidence backing a resolved identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeSignature {
    pub executable: PathBuf,
    pub manifest: PathBuf,
    /// SHA-256 of the executable as it is now, hex encoded.
    pub digest: String,
    /// SHA-256 recorded in the manifest at signing time, hex encoded.
    pub sealed_digest: String,
}

/// Identity of a connecting process, resolved per connection and never cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerIdentity {
    pub process_id: i32,
    pub application_id: ApplicationId,
    pub signing_authority_id: SigningAuthorityId,
    pub code: Option<CodeSignature>,
}

impl PeerIdentity {
    pub fn new(
        process_id: i32,
        application_id: ApplicationId,
        signing_authority_id: SigningAuthorityId,
    ) -> Self {
        Self {
            process_id,
            application_id,
            signing_authority_id,
            code: None,
        }
    }

    pub fn with_code(mut self, code: CodeSignature) -> Self {
        self.code = Some(code);
        self
    }
}

/// What a peer must prove before it may use the helper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustRequirement {
    pub application_id: ApplicationId,
    pub signing_authority_id: SigningAuthorityId,
    /// Owner uid required on signed artifacts.
    pub authority_uid: u32,
    /// Accepted executable digests; empty accepts any correctly sealed binary.
    pub pinned_digests: Vec<String>,
}

impl TrustRequirement {
    /// The controller identity baked into this build.
    pub fn compiled_in() -> Self {
        Self {
            application_id: ApplicationId(CONTROLLER_APPLICATION_ID.to_string()),
            signing_authority_id: SigningAuthorityId(SIGNING_AUTHORITY_ID.to_string()),
            authority_uid: 0,
            pinned_digests: Vec::new(),
        }
    }

    pub fn with_authority_uid(mut self, uid: u32) -> Self {
        self.authority_uid = uid;
        self
    }

    pub fn with_pinned_digests(mut self, digests: Vec<String>) -> Self {
        self.pinned_digests = digests
            .into_iter()
            .map(|digest| digest.trim().to_ascii_lowercase())
            .collect();
        self
    }

    /// Both identifiers must match; both comparisons always run.
    pub fn matches(&self, identity: &PeerIdentity) -> bool {
        let application = self
            .application_id
            .as_str()
            .as_bytes()
            .ct_eq(identity.application_id.as_str().as_bytes());
        let authority = self
            .signing_authority_id
            .as_str()
            .as_bytes()
            .ct_eq(identity.signing_authority_id.as_str().as_bytes());
        (application & authority).into()
    }

    pub fn pins(&self, digest: &str) -> bool {
        if self.pinned_digests.is_empty() {
            return true;
        }
        let digest = digest.to_ascii_lowercase();
        self.pinned_digests
            .iter()
            .any(|pinned| bool::from(pinned.as_bytes().ct_eq(digest.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn identity(app: &str, authority: &str) -> PeerIdentity {
        PeerIdentity::new(
            4242,
            ApplicationId::new(app).unwrap(),
            SigningAuthorityId::new(authority).unwrap(),
        )
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(ApplicationId::new("  ").is_err());
        assert!(SigningAuthorityId::new("").is_err());
    }

    #[test]
    fn compiled_in_requirement_accepts_controller() {
        let requirement = TrustRequirement::compiled_in();
        assert!(requirement.matches(&identity(CONTROLLER_APPLICATION_ID, SIGNING_AUTHORITY_ID)));
    }

    #[test]
    fn wrong_authority_alone_is_enough_to_reject() {
        let requirement = TrustRequirement::compiled_in();
        assert!(!requirement.matches(&identity(CONTROLLER_APPLICATION_ID, "AAAAAAAAAA")));
        assert!(!requirement.matches(&identity("com.example.other", SIGNING_AUTHORITY_ID)));
    }

    #[test]
    fn pins_accepts_any_digest_when_unpinned() {
        let requirement = TrustRequirement::compiled_in();
        assert!(requirement.pins("abcd"));
        let pinned = requirement.with_pinned_digests(vec![" ABCD ".into()]);
        assert!(pinned.pins("abcd"));
        assert!(!pinned.pins("abce"));
    }

    proptest! {
        #[test]
        fn any_field_mismatch_rejects(
            app in "[a-z.]{1,24}",
            authority in "[A-Z0-9]{1,12}",
        ) {
            let requirement = TrustRequirement::compiled_in();
            let accepted = requirement.matches(&identity(&app, &authority));
            let expected = app == CONTROLLER_APPLICATION_ID && authority == SIGNING_AUTHORITY_ID;
            prop_assert_eq!(accepted, expected);
            // Fixing only one of the two fields never flips a mismatch into acceptance.
            if authority != SIGNING_AUTHORITY_ID {
                prop_assert!(!requirement.matches(&identity(CONTROLLER_APPLICATION_ID, &authority)));
            }
            if app != CONTROLLER_APPLICATION_ID {
                prop_assert!(!requirement.matches(&identity(&app, SIGNING_AUTHORITY_ID)));
            }
        }
    }
}
