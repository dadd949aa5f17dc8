pub mod identity;
pub mod sequence;
