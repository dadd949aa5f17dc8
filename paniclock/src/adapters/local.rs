use crate::ports::local::{LocalActions, Notifier, SettingsSource};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use paniclock_ipc::{CommandRunner, CommandSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalCommands {
    pub lock: CommandSpec,
    pub lock_fallback: CommandSpec,
    pub screen_lock_status: CommandSpec,
    /// Reads the account password from stdin; an empty line is sent.
    pub screen_lock_immediate: CommandSpec,
    pub confirmation_sound: CommandSpec,
}

impl Default for LocalCommands {
    fn default() -> Self {
        Self {
            lock: CommandSpec::new(
                "/System/Library/CoreServices/Menu Extras/User.menu/Contents/Resources/CGSession",
                ["-suspend"],
            ),
            lock_fallback: CommandSpec::new("/usr/bin/pmset", ["displaysleepnow"]),
            screen_lock_status: CommandSpec::new("/usr/sbin/sysadminctl", ["-screenLock", "status"]),
            screen_lock_immediate: CommandSpec::new(
                "/usr/sbin/sysadminctl",
                ["-screenLock", "immediate", "-password", "-"],
            ),
            confirmation_sound: CommandSpec::new(
                "/usr/bin/afplay",
                ["/System/Library/Sounds/Funk.aiff"],
            ),
        }
    }
}

pub struct CommandLocalActions<R: CommandRunner> {
    runner: Arc<R>,
    commands: LocalCommands,
}

impl<R: CommandRunner> CommandLocalActions<R> {
    pub fn new(runner: Arc<R>, commands: LocalCommands) -> Self {
        Self { runner, commands }
    }

    async fn run_checked(&self, spec: &CommandSpec, stdin: Option<&[u8]>) -> anyhow::Result<()> {
        let output = self.runner.run(spec, stdin).await?;
        if output.success() {
            Ok(())
        } else {
            bail!(
                "{} exited with status {}: {}",
                spec.program,
                output.status_label(),
                output.output.trim()
            )
        }
    }
}

#[async_trait]
impl<R: CommandRunner + 'static> LocalActions for CommandLocalActions<R> {
    async fn lock_screen_only(&self) -> anyhow::Result<()> {
        let preferred = match self.run_checked(&self.commands.lock, None).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        warn!(error = %preferred, "local lock failed; trying fallback");
        self.run_checked(&self.commands.lock_fallback, None)
            .await
            .map_err(|fallback| anyhow!("lock failed: {preferred:#}; fallback failed: {fallback:#}"))
    }

    async fn ensure_immediate_lock(&self) -> anyhow::Result<()> {
        match self.runner.run(&self.commands.screen_lock_status, None).await {
            Ok(status) if status.output.contains("immediate") => {
                debug!("screen lock already immediate");
                return Ok(());
            }
            Ok(_) => {}
            // An unreadable status still gets the setting applied.
            Err(err) => warn!(error = %err, "could not read screen lock status"),
        }
        self.run_checked(&self.commands.screen_lock_immediate, Some(&b"\n"[..]))
            .await?;
        info!("screen lock set to immediate");
        Ok(())
    }
}

pub struct CommandNotifier<R: CommandRunner> {
    runner: Arc<R>,
    sound: CommandSpec,
}

impl<R: CommandRunner> CommandNotifier<R> {
    pub fn new(runner: Arc<R>, sound: CommandSpec) -> Self {
        Self { runner, sound }
    }
}

#[async_trait]
impl<R: CommandRunner + 'static> Notifier for CommandNotifier<R> {
    async fn play_confirmation(&self) -> anyhow::Result<()> {
        let output = self.runner.run(&self.sound, None).await?;
        if !output.success() {
            bail!("{} exited with status {}", self.sound.program, output.status_label());
        }
        Ok(())
    }
}

/// Preferences fixed at startup from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StaticSettings {
    pub confirmation_sound: bool,
}

impl SettingsSource for StaticSettings {
    fn confirmation_sound_enabled(&self) -> bool {
        self.confirmation_sound
    }
}
