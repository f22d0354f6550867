//! Domain layer types and invariants.

pub mod email;
pub mod error;
pub mod escape;
pub mod submission;
