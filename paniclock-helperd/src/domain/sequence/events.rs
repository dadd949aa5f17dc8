use super::value_object::SequenceState;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceTransition {
    pub run_id: Uuid,
    pub from: SequenceState,
    pub to: SequenceState,
    pub occurred_at: DateTime<Utc>,
}

impl SequenceTransition {
    pub fn new(run_id: Uuid, from: SequenceState, to: SequenceState) -> Self {
        Self {
            run_id,
            from,
            to,
            occurred_at: Utc::now(),
        }
    }
}
