use std::time::Duration;

/// Platform default biometric timeout (48 hours). Substituted when the current
/// value cannot be read.
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 172_800;

/// Smallest timeout that disables biometric unlock in practice.
pub const MINIMUM_TIMEOUT_SECONDS: u32 = 1;

/// How long the lowered timeout stays in place before it is restored.
pub const SEQUENCE_WAIT: Duration = Duration::from_secs(2);

/// Label of the line the read primitive prints the timeout on.
pub const TIMEOUT_LABEL: &str = "Biometric timeout";
