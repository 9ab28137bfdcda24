//! Read-only view of the rail network.
//!
//! The search only ever needs a handful of questions answered about the
//! infrastructure: how long a block is, which detectors bound it, and which
//! blocks meet at a detector. [`BlockInfra`] captures exactly that surface so
//! the search can run against any topology source. [`BlockGraph`] is the
//! in-memory implementation used by scenarios and tests.

mod error;
mod graph;

use serde::Serialize;

pub use error::InfraError;
pub use graph::BlockGraph;

/// Identifier of a block (the smallest reservable section of track).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block#{}", self.0)
    }
}

/// Identifier of a detector (the boundary between two blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DetectorId(pub u32);

impl std::fmt::Display for DetectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "detector#{}", self.0)
    }
}

/// Query surface over the block graph.
///
/// Implementations must be safe to share between concurrent searches; every
/// method takes `&self` and nothing here mutates.
///
/// Methods taking a [`BlockId`] may panic when given an id the
/// implementation never issued. Callers validate ids with
/// [`BlockInfra::contains`] at their boundary.
pub trait BlockInfra {
    /// Returns true if the block exists.
    fn contains(&self, block: BlockId) -> bool;

    /// Length of the block in metres.
    fn block_length(&self, block: BlockId) -> f64;

    /// Detector at the start of the block.
    fn block_entry(&self, block: BlockId) -> DetectorId;

    /// Detector at the end of the block.
    fn block_exit(&self, block: BlockId) -> DetectorId;

    /// Blocks whose exit is the given detector.
    fn blocks_ending_at(&self, detector: DetectorId) -> &[BlockId];

    /// Blocks whose entry is the given detector.
    fn blocks_starting_at(&self, detector: DetectorId) -> &[BlockId];

    /// Blocks that can follow `block` directly.
    fn successors(&self, block: BlockId) -> &[BlockId] {
        self.blocks_starting_at(self.block_exit(block))
    }

    /// Blocks that can precede `block` directly.
    fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.blocks_ending_at(self.block_entry(block))
    }
}
