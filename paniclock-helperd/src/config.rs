use crate::adapters::executor::PrimitiveCommands;
use crate::adapters::identity::CodesignCommands;
use crate::domain::identity::TrustRequirement;
use crate::domain::sequence::SequenceSettings;
use anyhow::Context;
use paniclock_ipc::defaults::{DEFAULT_TIMEOUT_SECONDS, MINIMUM_TIMEOUT_SECONDS, SEQUENCE_WAIT};
use paniclock_ipc::identifiers::{DEFAULT_SOCKET_PATH, HELPER_SERVICE_ID};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HelperConfig {
    pub socket_path: PathBuf,
    /// Octal permission bits applied to the socket after bind.
    pub socket_mode: u32,
    /// Peer lookup root on hosts without codesign.
    pub proc_root: PathBuf,
    /// Peer lookup on macOS.
    pub codesign: CodesignCommands,
    pub commands: PrimitiveCommands,
    pub sequence: SequenceConfig,
    pub trust: TrustConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SequenceConfig {
    pub minimum_timeout: u32,
    pub default_timeout: u32,
    pub wait_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrustConfig {
    pub authority_uid: u32,
    pub pinned_digests: Vec<String>,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            socket_mode: 0o600,
            proc_root: PathBuf::from("/proc"),
            codesign: CodesignCommands::default(),
            commands: PrimitiveCommands::default(),
            sequence: SequenceConfig::default(),
            trust: TrustConfig::default(),
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            minimum_timeout: MINIMUM_TIMEOUT_SECONDS,
            default_timeout: DEFAULT_TIMEOUT_SECONDS,
            wait_ms: SEQUENCE_WAIT.as_millis() as u64,
        }
    }
}

impl HelperConfig {
    /// `<config dir>/paniclock/<service id>.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join("paniclock")
                .join(format!("{HELPER_SERVICE_ID}.toml"))
        })
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Explicit path must exist; the default location is optional.
    pub fn load_or_default(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn sequence_settings(&self) -> SequenceSettings {
        SequenceSettings {
            minimum_timeout: self.sequence.minimum_timeout,
            default_timeout: self.sequence.default_timeout,
            wait: Duration::from_millis(self.sequence.wait_ms),
        }
    }

    pub fn trust_requirement(&self) -> TrustRequirement {
        TrustRequirement::compiled_in()
            .with_authority_uid(self.trust.authority_uid)
            .with_pinned_digests(self.trust.pinned_digests.clone())
    }
}
