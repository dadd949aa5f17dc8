use crate::adapters::installer::InstallerConfig;
use crate::adapters::local::LocalCommands;
use crate::adapters::unix_socket::ReplyTimeouts;
use crate::domain::retry::RetryPolicy;
use anyhow::{ensure, Context};
use paniclock_ipc::identifiers::DEFAULT_SOCKET_PATH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub socket_path: PathBuf,
    pub connect_timeout_ms: u64,
    /// Reply wait for ping and the timeout reads and writes.
    pub reply_timeout_ms: u64,
    /// Covers the helper's whole sequence, including its wait.
    pub sequence_timeout_ms: u64,
    pub confirmation_sound: bool,
    pub channel_retry: RetryConfig,
    pub liveness_retry: RetryConfig,
    pub installer: InstallerConfig,
    pub local: LocalCommands,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl RetryConfig {
    fn from_policy(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts(),
            base_delay_ms: policy.base_delay().as_millis() as u64,
            multiplier: policy.multiplier(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.multiplier,
        )
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            connect_timeout_ms: 2_000,
            reply_timeout_ms: 2_000,
            sequence_timeout_ms: 60_000,
            confirmation_sound: true,
            channel_retry: RetryConfig::from_policy(RetryPolicy::channel_default()),
            liveness_retry: RetryConfig::from_policy(RetryPolicy::liveness_default()),
            installer: InstallerConfig::default(),
            local: LocalCommands::default(),
        }
    }
}

impl ControllerConfig {
    /// `<config dir>/paniclock/controller.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("paniclock").join("controller.toml"))
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn load_or_default(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, retry) in [
            ("channel_retry", &self.channel_retry),
            ("liveness_retry", &self.liveness_retry),
        ] {
            ensure!(retry.max_attempts >= 1, "{name}.max_attempts must be at least 1");
            ensure!(
                retry.multiplier.is_finite() && retry.multiplier >= 1.0,
                "{name}.multiplier must be a finite number >= 1"
            );
        }
        ensure!(self.reply_timeout_ms > 0, "reply_timeout_ms must be positive");
        ensure!(
            self.sequence_timeout_ms >= self.reply_timeout_ms,
            "sequence_timeout_ms must not be shorter than reply_timeout_ms"
        );
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reply_timeouts(&self) -> ReplyTimeouts {
        ReplyTimeouts {
            reply: Duration::from_millis(self.reply_timeout_ms),
            sequence: Duration::from_millis(self.sequence_timeout_ms),
        }
    }
}
