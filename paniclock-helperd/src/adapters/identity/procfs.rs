use crate::domain::identity::{
    ApplicationId, CodeSignature, PeerCredentials, PeerIdentity, SigningAuthorityId,
    TrustRequirement,
};
use crate::ports::identity::{CodeIdentityResolver, IdentityError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use subtle::ConstantTimeEq;

const MANIFEST_SUFFIX: &str = ".sig.json";

/// Signature manifest installed next to a signed executable as
/// `<executable>.sig.json`. Packaging writes it after installing the binary,
/// with the same owner and mode rules as the binary itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureManifest {
    pub application_id: ApplicationId,
    pub signing_authority_id: SigningAuthorityId,
    /// Hex-encoded SHA-256 of the executable at signing time.
    pub sha256: String,
}

/// Resolves peers through `/proc/<pid>/exe` and the manifest sealed next to
/// the executable. Signed artifacts must be owned by the authority uid and
/// must not be group or world writable.
#[derive(Clone, Debug)]
pub struct ProcfsIdentityResolver {
    proc_root: PathBuf,
}

impl Default for ProcfsIdentityResolver {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcfsIdentityResolver {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    fn load_manifest(path: &Path) -> Result<SignatureManifest, IdentityError> {
        let manifest_error = |reason: String| IdentityError::Manifest {
            path: path.display().to_string(),
            reason,
        };
        let raw = fs::read_to_string(path).map_err(|err| manifest_error(err.to_string()))?;
        serde_json::from_str(&raw).map_err(|err| manifest_error(err.to_string()))
    }
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn manifest_path(executable: &Path) -> PathBuf {
    let mut raw = executable.as_os_str().to_owned();
    raw.push(MANIFEST_SUFFIX);
    PathBuf::from(raw)
}

fn check_artifact(path: &Path, authority_uid: u32) -> Result<(), IdentityError> {
    let metadata = fs::metadata(path).map_err(|err| {
        IdentityError::Validation(format!("cannot stat {}: {err}", path.display()))
    })?;
    if metadata.uid() != authority_uid {
        return Err(IdentityError::Validation(format!(
            "{} is owned by uid {}, expected {}",
            path.display(),
            metadata.uid(),
            authority_uid
        )));
    }
    if metadata.mode() & 0o022 != 0 {
        return Err(IdentityError::Validation(format!(
            "{} is writable by group or others (mode {:o})",
            path.display(),
            metadata.mode() & 0o7777
        )));
    }
    Ok(())
}

impl CodeIdentityResolver for ProcfsIdentityResolver {
    fn resolve(&self, peer: &PeerCredentials) -> Result<PeerIdentity, IdentityError> {
        let pid = peer.pid.ok_or(IdentityError::MissingPid)?;
        let exe_link = self.proc_root.join(pid.to_string()).join("exe");
        let executable = fs::read_link(&exe_link).map_err(|err| IdentityError::Executable {
            pid,
            reason: err.to_string(),
        })?;
        // Hash through the proc link so a replaced path cannot stand in for
        // the image that is actually running.
        let digest = sha256_file(&exe_link).map_err(|err| IdentityError::Executable {
            pid,
            reason: err.to_string(),
        })?;
        let manifest = manifest_path(&executable);
        let sealed = Self::load_manifest(&manifest)?;
        Ok(PeerIdentity::new(pid, sealed.application_id, sealed.signing_authority_id)
            .with_code(CodeSignature {
                executable,
                manifest,
                digest,
                sealed_digest: sealed.sha256.trim().to_ascii_lowercase(),
            }))
    }

    fn check_requirement(
        &self,
        identity: &PeerIdentity,
        requirement: &TrustRequirement,
    ) -> Result<(), IdentityError> {
        if !requirement.matches(identity) {
            return Err(IdentityError::Validation(format!(
                "identity {}/{} does not satisfy requirement",
                identity.application_id, identity.signing_authority_id
            )));
        }
        let code = identity
            .code
            .as_ref()
            .ok_or_else(|| IdentityError::Validation("no code evidence for peer".into()))?;
        if !bool::from(code.digest.as_bytes().ct_eq(code.sealed_digest.as_bytes())) {
            return Err(IdentityError::Validation(format!(
                "{} was modified after signing",
                code.executable.display()
            )));
        }
        if !requirement.pins(&code.digest) {
            return Err(IdentityError::Validation(format!(
                "digest {} is not pinned",
                code.digest
            )));
        }
        check_artifact(&code.executable, requirement.authority_uid)?;
        check_artifact(&code.manifest, requirement.authority_uid)
    }
}
