use crate::ports::installer::{InstallerError, WorkerInstaller};
use async_trait::async_trait;
use paniclock_ipc::identifiers::{HELPER_SERVICE_ID, INSTALLED_HELPER_PATH, INSTALLED_LAUNCHD_PLIST};
use paniclock_ipc::{CommandRunner, CommandSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const STEP_FAILED_MARKER: &str = "paniclock: step failed: ";

/// How the batch script gains root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Elevation {
    /// `osascript` administrator prompt.
    Osascript,
    /// Non-interactive `sudo -n`.
    Sudo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallerConfig {
    pub elevation: Elevation,
    /// Helper binary shipped inside the controller bundle.
    pub helper_source: PathBuf,
    pub plist_source: PathBuf,
    pub installed_helper: PathBuf,
    pub launchd_plist: PathBuf,
    /// Controller installation removed on uninstall.
    pub controller_bundle: PathBuf,
    pub launchctl: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        let bundle = PathBuf::from("/Applications/PanicLock.app");
        Self {
            elevation: Elevation::Osascript,
            helper_source: bundle
                .join("Contents/Library/LaunchServices")
                .join(HELPER_SERVICE_ID),
            plist_source: bundle
                .join("Contents/Library/LaunchDaemons")
                .join(format!("{HELPER_SERVICE_ID}.plist")),
            installed_helper: PathBuf::from(INSTALLED_HELPER_PATH),
            launchd_plist: PathBuf::from(INSTALLED_LAUNCHD_PLIST),
            controller_bundle: bundle,
            launchctl: "/bin/launchctl".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OnFailure {
    Stop,
    Continue,
}

struct Step {
    label: &'static str,
    argv: Vec<String>,
    /// Failure is ignored and never reported.
    optional: bool,
}

impl Step {
    fn new<I, S>(label: &'static str, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label,
            argv: argv.into_iter().map(Into::into).collect(),
            optional: false,
        }
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// One `/bin/sh` script running every step, marking each failure on its own
/// line so they can be reported together.
fn batch_script(steps: &[Step], on_failure: OnFailure) -> String {
    let mut script = String::from("failed=0");
    for step in steps {
        if step.optional {
            script.push_str(&format!("; {} >/dev/null 2>&1 || true", shell_words::join(&step.argv)));
            continue;
        }
        let marker = shell_words::quote(&format!("{STEP_FAILED_MARKER}{}", step.label)).into_owned();
        let command = shell_words::join(&step.argv);
        let bail = match on_failure {
            OnFailure::Stop => "exit 1",
            OnFailure::Continue => "failed=1",
        };
        script.push_str(&format!(
            "; if ! {command} 2>&1; then echo {marker} >&2; {bail}; fi"
        ));
    }
    script.push_str("; exit $failed");
    script
}

fn applescript_string(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

fn is_authorization_failure(output: &str) -> bool {
    let lowered = output.to_ascii_lowercase();
    lowered.contains("user canceled")
        || lowered.contains("(-128)")
        || lowered.contains("a password is required")
        || lowered.contains("not allowed")
}

/// Installs and removes the helper by running privileged shell batches.
pub struct CommandWorkerInstaller<R: CommandRunner> {
    runner: Arc<R>,
    config: InstallerConfig,
}

impl<R: CommandRunner> CommandWorkerInstaller<R> {
    pub fn new(runner: Arc<R>, config: InstallerConfig) -> Self {
        Self { runner, config }
    }

    fn service_target(&self) -> String {
        format!("system/{HELPER_SERVICE_ID}")
    }

    fn install_steps(&self) -> Vec<Step> {
        let config = &self.config;
        let helper_dir = config
            .installed_helper
            .parent()
            .map(path_arg)
            .unwrap_or_else(|| "/".to_string());
        vec![
            // A previous copy may still be loaded when reinstalling.
            Step::new(
                "stop previous helper",
                [config.launchctl.clone(), "bootout".to_string(), self.service_target()],
            )
            .optional(),
            Step::new("create helper directory", ["/bin/mkdir", "-p", helper_dir.as_str()]),
            Step::new(
                "copy helper binary",
                [
                    "/bin/cp".to_string(),
                    "-f".to_string(),
                    path_arg(&config.helper_source),
                    path_arg(&config.installed_helper),
                ],
            ),
            Step::new(
                "copy launchd plist",
                [
                    "/bin/cp".to_string(),
                    "-f".to_string(),
                    path_arg(&config.plist_source),
                    path_arg(&config.launchd_plist),
                ],
            ),
            Step::new(
                "set ownership",
                [
                    "/usr/sbin/chown".to_string(),
                    "root:wheel".to_string(),
                    path_arg(&config.installed_helper),
                    path_arg(&config.launchd_plist),
                ],
            ),
            Step::new(
                "set helper mode",
                ["/bin/chmod".to_string(), "0544".to_string(), path_arg(&config.installed_helper)],
            ),
            Step::new(
                "set plist mode",
                ["/bin/chmod".to_string(), "0644".to_string(), path_arg(&config.launchd_plist)],
            ),
            Step::new(
                "register helper",
                [
                    config.launchctl.clone(),
                    "bootstrap".to_string(),
                    "system".to_string(),
                    path_arg(&config.launchd_plist),
                ],
            ),
        ]
    }

    fn uninstall_steps(&self) -> Vec<Step> {
        let config = &self.config;
        vec![
            Step::new(
                "deregister helper",
                [config.launchctl.clone(), "bootout".to_string(), self.service_target()],
            ),
            Step::new(
                "remove helper artifacts",
                [
                    "/bin/rm".to_string(),
                    "-f".to_string(),
                    path_arg(&config.installed_helper),
                    path_arg(&config.launchd_plist),
                ],
            ),
            Step::new(
                "remove controller installation",
                ["/bin/rm".to_string(), "-rf".to_string(), path_arg(&config.controller_bundle)],
            ),
        ]
    }

    fn privileged(&self, script: &str) -> CommandSpec {
        match self.config.elevation {
            Elevation::Osascript => CommandSpec::new(
                "/usr/bin/osascript",
                [
                    "-e".to_string(),
                    format!(
                        "do shell script {} with administrator privileges",
                        applescript_string(script)
                    ),
                ],
            ),
            Elevation::Sudo => CommandSpec::new(
                "/usr/bin/sudo",
                ["-n", "/bin/sh", "-c", script],
            ),
        }
    }

    async fn run_batch(
        &self,
        action: &str,
        steps: &[Step],
        on_failure: OnFailure,
    ) -> Result<(), InstallerError> {
        let script = batch_script(steps, on_failure);
        let spec = self.privileged(&script);
        let output = self
            .runner
            .run(&spec, None)
            .await
            .map_err(|err| InstallerError::Spawn(format!("{err:#}")))?;
        if output.success() {
            info!(action, "privileged batch completed");
            return Ok(());
        }
        let failed_steps: Vec<&str> = output
            .output
            .lines()
            .filter_map(|line| {
                line.find(STEP_FAILED_MARKER)
                    .map(|at| line[at + STEP_FAILED_MARKER.len()..].trim())
            })
            .collect();
        let error = if !failed_steps.is_empty() {
            InstallerError::Failed(format!("{action} failed: {}", failed_steps.join("; ")))
        } else if is_authorization_failure(&output.output) {
            InstallerError::Unauthorized(output.output.trim().to_string())
        } else {
            InstallerError::Failed(format!(
                "{action} failed with status {}: {}",
                output.status_label(),
                output.output.trim()
            ))
        };
        warn!(action, error = %error, "privileged batch failed");
        Err(error)
    }
}

#[async_trait]
impl<R: CommandRunner + 'static> WorkerInstaller for CommandWorkerInstaller<R> {
    async fn is_installed(&self) -> bool {
        let helper = tokio::fs::try_exists(&self.config.installed_helper)
            .await
            .unwrap_or(false);
        let plist = tokio::fs::try_exists(&self.config.launchd_plist)
            .await
            .unwrap_or(false);
        helper && plist
    }

    async fn install(&self) -> Result<(), InstallerError> {
        self.run_batch("install", &self.install_steps(), OnFailure::Stop)
            .await
    }

    async fn uninstall(&self) -> Result<(), InstallerError> {
        self.run_batch("uninstall", &self.uninstall_steps(), OnFailure::Continue)
            .await
    }
}
