use super::events::SequenceTransition;
use super::value_object::SequenceState;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One invocation of the panic sequence. Lives only as long as the run.
#[derive(Clone, Debug)]
pub struct SequenceRun {
    id: Uuid,
    state: SequenceState,
    original_timeout: Option<u32>,
    started_at: DateTime<Utc>,
}

impl SequenceRun {
    pub fn start() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SequenceState::Idle,
            original_timeout: None,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    pub fn original_timeout(&self) -> Option<u32> {
        self.original_timeout
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn advance(&mut self, next: SequenceState) -> Result<SequenceTransition, String> {
        if !self.state.can_transition_to(next) {
            return Err(format!(
                "invalid sequence transition {} -> {}",
                self.state, next
            ));
        }
        if next == SequenceState::LoweringTimeout && self.original_timeout.is_none() {
            return Err("original timeout must be captured before lowering".into());
        }
        let transition = SequenceTransition::new(self.id, self.state, next);
        self.state = next;
        Ok(transition)
    }

    /// Record the baseline to restore. Only once, and only before mutation.
    pub fn capture_original(&mut self, seconds: u32) -> Result<(), String> {
        if self.state != SequenceState::ReadingTimeout {
            return Err(format!(
                "original timeout can only be captured while reading (state: {})",
                self.state
            ));
        }
        if self.original_timeout.is_some() {
            return Err("original timeout already captured".into());
        }
        self.original_timeout = Some(seconds);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_recorded() {
        let mut run = SequenceRun::start();
        let first = run.advance(SequenceState::ReadingTimeout).unwrap();
        assert_eq!(first.from, SequenceState::Idle);
        assert_eq!(first.run_id, run.id());
        run.capture_original(1800).unwrap();
        for next in [
            SequenceState::LoweringTimeout,
            SequenceState::Locking,
            SequenceState::Waiting,
            SequenceState::Restoring,
            SequenceState::Completed,
        ] {
            run.advance(next).unwrap();
        }
        assert!(run.state().is_terminal());
        assert_eq!(run.original_timeout(), Some(1800));
        assert!(run.started_at() <= Utc::now());
    }

    #[test]
    fn lowering_requires_captured_baseline() {
        let mut run = SequenceRun::start();
        run.advance(SequenceState::ReadingTimeout).unwrap();
        assert!(run.advance(SequenceState::LoweringTimeout).is_err());
    }

    #[test]
    fn baseline_cannot_be_overwritten() {
        let mut run = SequenceRun::start();
        assert!(run.capture_original(10).is_err());
        run.advance(SequenceState::ReadingTimeout).unwrap();
        run.capture_original(10).unwrap();
        assert!(run.capture_original(20).is_err());
        assert_eq!(run.original_timeout(), Some(10));
    }

    #[test]
    fn skipping_restore_is_rejected() {
        let mut run = SequenceRun::start();
        run.advance(SequenceState::ReadingTimeout).unwrap();
        run.capture_original(5).unwrap();
        run.advance(SequenceState::LoweringTimeout).unwrap();
        run.advance(SequenceState::Locking).unwrap();
        assert!(run.advance(SequenceState::Completed).is_err());
        assert_eq!(run.state(), SequenceState::Locking);
    }
}
