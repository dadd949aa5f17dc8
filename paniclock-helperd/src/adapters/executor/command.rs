use crate::ports::executor::{ExecutorError, PrivilegedExecutor};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use paniclock_ipc::defaults::TIMEOUT_LABEL;
use paniclock_ipc::{CommandOutput, CommandRunner, CommandSpec};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

static DEFAULT_TIMEOUT_PATTERN: Lazy<Regex> =
    Lazy::new(|| timeout_pattern(TIMEOUT_LABEL).expect("valid timeout pattern"));

/// Matches `<label>...: <integer>` on its own line, taking the value after
/// the last colon.
fn timeout_pattern(label: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?m)^[ \t]*{}[^\n]*:[ \t]*(\d+)[ \t\r]*$",
        regex::escape(label)
    ))
}

/// Command lines for the external primitives. `set_timeout` must contain a
/// `{seconds}` placeholder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimitiveCommands {
    pub timeout_label: String,
    pub read_timeout: CommandSpec,
    pub set_timeout: CommandSpec,
    pub lock: CommandSpec,
    pub lock_fallback: CommandSpec,
}

impl Default for PrimitiveCommands {
    fn default() -> Self {
        Self {
            timeout_label: TIMEOUT_LABEL.to_string(),
            read_timeout: CommandSpec::new("/usr/bin/bioutil", ["-r", "-s"]),
            set_timeout: CommandSpec::new("/usr/bin/bioutil", ["-w", "-s", "-o", "{seconds}"]),
            lock: CommandSpec::new("/usr/bin/pmset", ["displaysleepnow"]),
            lock_fallback: CommandSpec::new(
                "/System/Library/CoreServices/Menu Extras/User.menu/Contents/Resources/CGSession",
                ["-suspend"],
            ),
        }
    }
}

pub struct CommandPrivilegedExecutor<R: CommandRunner> {
    runner: Arc<R>,
    commands: PrimitiveCommands,
    pattern: Regex,
}

impl<R: CommandRunner> CommandPrivilegedExecutor<R> {
    pub fn new(runner: Arc<R>, commands: PrimitiveCommands) -> anyhow::Result<Self> {
        if !commands
            .set_timeout
            .args
            .iter()
            .any(|arg| arg.contains("{seconds}"))
        {
            anyhow::bail!("set_timeout command must contain a {{seconds}} placeholder");
        }
        let pattern = if commands.timeout_label == TIMEOUT_LABEL {
            DEFAULT_TIMEOUT_PATTERN.clone()
        } else {
            timeout_pattern(&commands.timeout_label)?
        };
        Ok(Self {
            runner,
            commands,
            pattern,
        })
    }

    fn parse_timeout(&self, output: &str) -> Option<u32> {
        self.pattern
            .captures(output)
            .and_then(|caps| caps.get(1))
            .and_then(|value| value.as_str().parse().ok())
    }

    async fn invoke(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecutorError> {
        self.runner
            .run(spec, None)
            .await
            .map_err(|err| ExecutorError::Spawn {
                program: spec.program.clone(),
                reason: format!("{err:#}"),
            })
    }

    async fn invoke_checked(&self, spec: &CommandSpec) -> Result<(), ExecutorError> {
        let output = self.invoke(spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(ExecutorError::Exit {
                program: spec.program.clone(),
                status: output.status_label(),
                output: output.output.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl<R: CommandRunner + 'static> PrivilegedExecutor for CommandPrivilegedExecutor<R> {
    async fn read_timeout(&self) -> Result<u32, ExecutorError> {
        let spec = &self.commands.read_timeout;
        let output = self.invoke(spec).await?;
        match self.parse_timeout(&output.output) {
            Some(seconds) => {
                debug!(seconds, "read biometric timeout");
                Ok(seconds)
            }
            None if !output.success() => Err(ExecutorError::Exit {
                program: spec.program.clone(),
                status: output.status_label(),
                output: output.output.trim().to_string(),
            }),
            None => Err(ExecutorError::Parse(output.output.trim().to_string())),
        }
    }

    async fn set_timeout(&self, seconds: u32) -> Result<(), ExecutorError> {
        let spec = self
            .commands
            .set_timeout
            .render("seconds", &seconds.to_string());
        self.invoke_checked(&spec).await
    }

    async fn trigger_lock(&self) -> Result<(), ExecutorError> {
        let preferred = match self.invoke_checked(&self.commands.lock).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        warn!(%preferred, "preferred lock primitive failed; trying fallback");
        self.invoke_checked(&self.commands.lock_fallback)
            .await
            .map_err(|fallback| ExecutorError::LockUnavailable {
                preferred: preferred.to_string(),
                fallback: fallback.to_string(),
            })
    }
}
