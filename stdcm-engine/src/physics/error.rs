//! Physics error types.

/// Errors raised while simulating or constructing envelopes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PhysicsError {
    /// Rolling stock characteristic is not usable
    #[error("invalid rolling stock: {0}")]
    InvalidRollingStock(&'static str),

    /// Envelope points are not a valid trajectory
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(&'static str),

    /// Simulation input cannot produce a trajectory
    #[error("invalid simulation context: {0}")]
    InvalidContext(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PhysicsError::InvalidRollingStock("max speed must be positive");
        assert_eq!(
            err.to_string(),
            "invalid rolling stock: max speed must be positive"
        );

        let err = PhysicsError::InvalidEnvelope("positions must not decrease");
        assert_eq!(
            err.to_string(),
            "invalid envelope: positions must not decrease"
        );

        let err = PhysicsError::InvalidContext("length must be positive");
        assert_eq!(
            err.to_string(),
            "invalid simulation context: length must be positive"
        );
    }
}
