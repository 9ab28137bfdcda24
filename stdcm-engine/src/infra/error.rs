//! Infrastructure error types.

use super::BlockId;

/// Errors raised while building or querying the block graph.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InfraError {
    /// Block length is zero, negative or not a number
    #[error("invalid block length: {0}")]
    InvalidLength(f64),

    /// Block id not present in the graph
    #[error("unknown block: {0}")]
    UnknownBlock(BlockId),

    /// Offset lies outside the block
    #[error("offset {offset} is outside {block} (length {length})")]
    OffsetOutOfBlock {
        block: BlockId,
        offset: f64,
        length: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = InfraError::InvalidLength(-3.0);
        assert_eq!(err.to_string(), "invalid block length: -3");

        let err = InfraError::UnknownBlock(BlockId(7));
        assert_eq!(err.to_string(), "unknown block: block#7");

        let err = InfraError::OffsetOutOfBlock {
            block: BlockId(1),
            offset: 1200.0,
            length: 1000.0,
        };
        assert_eq!(
            err.to_string(),
            "offset 1200 is outside block#1 (length 1000)"
        );
    }
}
