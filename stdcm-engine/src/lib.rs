//! Short-term train path search.
//!
//! Answers: "given the trains already scheduled on this network, when and
//! where can one more train run from its origin to its destination without
//! conflicting with any of them?"

pub mod conflicts;
pub mod infra;
pub mod physics;
pub mod scenario;
pub mod stdcm;
