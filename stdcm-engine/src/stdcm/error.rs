//! Path search error types.

use crate::infra::InfraError;
use crate::physics::{AllowanceError, PhysicsError};

/// Error from a train path search.
///
/// Branches pruned for exceeding the run time or the departure delay budget
/// are not errors; they only surface as [`StdcmError::NoPathFound`] when
/// every branch was pruned.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StdcmError {
    /// Request cannot be searched
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request refers to missing infrastructure
    #[error(transparent)]
    Infra(#[from] InfraError),

    /// No block sequence reaches the destination within the bounds
    #[error("no path found")]
    NoPathFound,

    /// Conflict refinement ran out of iterations
    #[error("no conflict-free schedule found after {iterations} iterations")]
    NoConflictFreeSchedule { iterations: usize },

    /// A conflict kept recurring at an already fixed point after falling
    /// back to the linear distribution
    #[error("conflict at {offset:.3}m persists at a fixed time point")]
    RepeatedFixedPoint { offset: f64 },

    /// Availability could not be decided from the available data
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Simulation failed
    #[error(transparent)]
    Physics(#[from] PhysicsError),

    /// Allowance could not be applied
    #[error(transparent)]
    Allowance(#[from] AllowanceError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::BlockId;

    #[test]
    fn error_display() {
        let err = StdcmError::InvalidRequest("at least two steps are required".into());
        assert_eq!(
            err.to_string(),
            "invalid request: at least two steps are required"
        );

        let err = StdcmError::from(InfraError::UnknownBlock(BlockId(3)));
        assert_eq!(err.to_string(), "unknown block: block#3");

        assert_eq!(StdcmError::NoPathFound.to_string(), "no path found");

        let err = StdcmError::NoConflictFreeSchedule { iterations: 6 };
        assert_eq!(
            err.to_string(),
            "no conflict-free schedule found after 6 iterations"
        );

        let err = StdcmError::RepeatedFixedPoint { offset: 1250.0 };
        assert_eq!(
            err.to_string(),
            "conflict at 1250.000m persists at a fixed time point"
        );

        let err = StdcmError::InsufficientData("path ends before sight distance".into());
        assert_eq!(
            err.to_string(),
            "insufficient data: path ends before sight distance"
        );
    }
}
