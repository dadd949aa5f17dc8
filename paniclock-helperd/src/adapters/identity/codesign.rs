use crate::domain::identity::{
    ApplicationId, PeerCredentials, PeerIdentity, SigningAuthorityId, TrustRequirement,
};
use crate::ports::identity::{CodeIdentityResolver, IdentityError};
use paniclock_ipc::{CommandOutput, CommandRunner, CommandSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

/// `codesign` invocations. Both take a `{pid}` placeholder; `verify` also
/// takes `{requirement}`. Given a pid, codesign checks the running image
/// rather than whatever is on disk at that path now.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodesignCommands {
    pub describe: CommandSpec,
    pub verify: CommandSpec,
}

impl Default for CodesignCommands {
    fn default() -> Self {
        Self {
            describe: CommandSpec::new("/usr/bin/codesign", ["-d", "--verbose=2", "{pid}"]),
            verify: CommandSpec::new(
                "/usr/bin/codesign",
                ["--verify", "-R={requirement}", "{pid}"],
            ),
        }
    }
}

/// Resolves peers with the host's code-signing tool. The trust requirement
/// is expressed as a code requirement anchored at Apple's developer root, so
/// a matching identifier and team are not enough without a valid chain.
///
/// The trait is synchronous; commands are driven on `runtime` with
/// `block_on`, so callers must be on a blocking thread.
pub struct CodesignIdentityResolver<R: CommandRunner> {
    runner: Arc<R>,
    commands: CodesignCommands,
    runtime: Handle,
}

impl<R: CommandRunner> CodesignIdentityResolver<R> {
    pub fn new(runner: Arc<R>, commands: CodesignCommands, runtime: Handle) -> Self {
        Self {
            runner,
            commands,
            runtime,
        }
    }

    fn run(&self, spec: &CommandSpec, pid: i32) -> Result<CommandOutput, IdentityError> {
        self.runtime
            .block_on(self.runner.run(spec, None))
            .map_err(|err| IdentityError::Executable {
                pid,
                reason: format!("{}: {err:#}", spec.program),
            })
    }
}

/// Value of the first `key=value` line in codesign's description.
fn field<'a>(description: &'a str, key: &str) -> Option<&'a str> {
    description.lines().find_map(|line| {
        line.trim()
            .strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::trim)
    })
}

/// Code requirement text for `requirement`. Pinned digests become
/// alternatives on the code directory hash.
pub fn requirement_text(requirement: &TrustRequirement) -> Result<String, IdentityError> {
    let quoted = |value: &str| {
        if value.contains('"') {
            return Err(IdentityError::Validation(format!(
                "cannot quote {value:?} in a code requirement"
            )));
        }
        Ok(format!("\"{value}\""))
    };
    let mut text = format!(
        "identifier {} and anchor apple generic and certificate leaf[subject.OU] = {}",
        quoted(requirement.application_id.as_str())?,
        quoted(requirement.signing_authority_id.as_str())?,
    );
    if !requirement.pinned_digests.is_empty() {
        let mut pins = Vec::with_capacity(requirement.pinned_digests.len());
        for digest in &requirement.pinned_digests {
            if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(IdentityError::Validation(format!(
                    "pinned digest {digest:?} is not hex"
                )));
            }
            pins.push(format!("cdhash H\"{digest}\""));
        }
        text.push_str(&format!(" and ({})", pins.join(" or ")));
    }
    Ok(text)
}

impl<R: CommandRunner> CodeIdentityResolver for CodesignIdentityResolver<R> {
    fn resolve(&self, peer: &PeerCredentials) -> Result<PeerIdentity, IdentityError> {
        let pid = peer.pid.ok_or(IdentityError::MissingPid)?;
        let spec = self.commands.describe.render("pid", &pid.to_string());
        let output = self.run(&spec, pid)?;
        if !output.success() {
            return Err(IdentityError::Executable {
                pid,
                reason: format!(
                    "{} exited with {}: {}",
                    spec.program,
                    output.status_label(),
                    output.output.trim()
                ),
            });
        }
        let unsigned = |key: &str| {
            IdentityError::Validation(format!("pid {pid} has no {key} in its signature"))
        };
        let application_id = field(&output.output, "Identifier")
            .and_then(|value| ApplicationId::new(value).ok())
            .ok_or_else(|| unsigned("Identifier"))?;
        let signing_authority_id = field(&output.output, "TeamIdentifier")
            .filter(|value| *value != "not set")
            .and_then(|value| SigningAuthorityId::new(value).ok())
            .ok_or_else(|| unsigned("TeamIdentifier"))?;
        debug!(
            pid,
            executable = field(&output.output, "Executable").unwrap_or("?"),
            "described peer signature"
        );
        Ok(PeerIdentity::new(pid, application_id, signing_authority_id))
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
        let pid = identity.process_id;
        let spec = self
            .commands
            .verify
            .render("requirement", &requirement_text(requirement)?)
            .render("pid", &pid.to_string());
        let output = self.run(&spec, pid)?;
        if output.success() {
            Ok(())
        } else {
            Err(IdentityError::Validation(format!(
                "code requirement not satisfied ({}): {}",
                output.status_label(),
                output.output.trim()
            )))
        }
    }
}
