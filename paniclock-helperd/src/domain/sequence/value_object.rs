use paniclock_ipc::defaults::{DEFAULT_TIMEOUT_SECONDS, MINIMUM_TIMEOUT_SECONDS, SEQUENCE_WAIT};
use std::fmt;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SequenceState {
    Idle,
    ReadingTimeout,
    LoweringTimeout,
    Locking,
    Waiting,
    Restoring,
    Completed,
    Failed,
}

impl SequenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceState::Idle => "idle",
            SequenceState::ReadingTimeout => "reading_timeout",
            SequenceState::LoweringTimeout => "lowering_timeout",
            SequenceState::Locking => "locking",
            SequenceState::Waiting => "waiting",
            SequenceState::Restoring => "restoring",
            SequenceState::Completed => "completed",
            SequenceState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SequenceState::Completed | SequenceState::Failed)
    }

    /// `Failed` is only reachable while the timeout is being lowered; every
    /// later state must run through `Restoring`.
    pub fn can_transition_to(&self, next: SequenceState) -> bool {
        use SequenceState::*;
        matches!(
            (self, next),
            (Idle, ReadingTimeout)
                | (ReadingTimeout, LoweringTimeout)
                | (LoweringTimeout, Locking)
                | (LoweringTimeout, Failed)
                | (Locking, Waiting)
                | (Waiting, Restoring)
                | (Restoring, Completed)
        )
    }
}

impl fmt::Display for SequenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SequenceSettings {
    /// Value written to disable biometric unlock.
    pub minimum_timeout: u32,
    /// Baseline restored when the current value could not be read.
    pub default_timeout: u32,
    /// How long the lowered value stays in place after locking.
    pub wait: Duration,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            minimum_timeout: MINIMUM_TIMEOUT_SECONDS,
            default_timeout: DEFAULT_TIMEOUT_SECONDS,
            wait: SEQUENCE_WAIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_only_reachable_from_lowering() {
        use SequenceState::*;
        for state in [Idle, ReadingTimeout, Locking, Waiting, Restoring, Completed] {
            assert!(!state.can_transition_to(Failed), "{state} -> failed");
        }
        assert!(LoweringTimeout.can_transition_to(Failed));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        use SequenceState::*;
        let all = [
            Idle,
            ReadingTimeout,
            LoweringTimeout,
            Locking,
            Waiting,
            Restoring,
            Completed,
            Failed,
        ];
        for terminal in [Completed, Failed] {
            assert!(terminal.is_terminal());
            assert!(all.iter().all(|next| !terminal.can_transition_to(*next)));
        }
    }
}
