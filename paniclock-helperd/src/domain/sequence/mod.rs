pub mod aggregate;
pub mod events;
pub mod value_object;

pub use aggregate::SequenceRun;
pub use events::SequenceTransition;
pub use value_object::{SequenceSettings, SequenceState};
