use std::fmt;

/// What the UI sees for a user-initiated action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub reason: Option<String>,
    /// The privileged path was unavailable and a local substitute ran instead.
    pub degraded: bool,
}

impl ActionOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            reason: None,
            degraded: false,
        }
    }

    pub fn succeeded_with(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            reason: Some(reason.into()),
            degraded: false,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            degraded: false,
        }
    }

    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match (self.success, self.degraded) {
            (true, false) => "ok",
            (true, true) => "ok (degraded)",
            (false, _) => "failed",
        };
        match &self.reason {
            Some(reason) => write!(f, "{status}: {reason}"),
            None => f.write_str(status),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerReadiness {
    /// Helper was missing and has been installed.
    Installed,
    /// Helper answered a ping.
    Responsive,
    /// Helper was installed but unresponsive, so it was installed again.
    Reinstalled,
    InstallFailed(String),
}

impl WorkerReadiness {
    pub fn is_ready(&self) -> bool {
        !matches!(self, WorkerReadiness::InstallFailed(_))
    }
}

impl fmt::Display for WorkerReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerReadiness::Installed => f.write_str("installed"),
            WorkerReadiness::Responsive => f.write_str("responsive"),
            WorkerReadiness::Reinstalled => f.write_str("reinstalled"),
            WorkerReadiness::InstallFailed(reason) => write!(f, "install failed: {reason}"),
        }
    }
}
