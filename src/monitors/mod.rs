//! Alert rules
//!
//! Pure evaluations that turn one observation into a decision. They know
//! nothing about storage or delivery; [`crate::alerts::AlertEngine`] wires
//! them together.

pub mod resources;
pub mod status;

pub use resources::CpuEvaluation;
pub use status::StatusTransition;
