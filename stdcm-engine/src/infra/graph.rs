//! In-memory block graph.

use std::collections::HashMap;

use super::{BlockId, BlockInfra, DetectorId, InfraError};

#[derive(Debug, Clone)]
struct BlockData {
    entry: DetectorId,
    exit: DetectorId,
    length: f64,
}

/// Directed graph of blocks joined at detectors.
///
/// # Examples
///
/// ```
/// use stdcm_engine::infra::{BlockGraph, BlockInfra, DetectorId};
///
/// let mut graph = BlockGraph::new();
/// let a = graph.add_block(DetectorId(0), DetectorId(1), 1000.0).unwrap();
/// let b = graph.add_block(DetectorId(1), DetectorId(2), 500.0).unwrap();
///
/// assert_eq!(graph.successors(a), &[b]);
/// assert_eq!(graph.predecessors(b), &[a]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BlockGraph {
    blocks: Vec<BlockData>,
    starting_at: HashMap<DetectorId, Vec<BlockId>>,
    ending_at: HashMap<DetectorId, Vec<BlockId>>,
}

impl BlockGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block from `entry` to `exit` and return its id.
    pub fn add_block(
        &mut self,
        entry: DetectorId,
        exit: DetectorId,
        length: f64,
    ) -> Result<BlockId, InfraError> {
        if !length.is_finite() || length <= 0.0 {
            return Err(InfraError::InvalidLength(length));
        }

        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            entry,
            exit,
            length,
        });
        self.starting_at.entry(entry).or_default().push(id);
        self.ending_at.entry(exit).or_default().push(id);
        Ok(id)
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if the graph has no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterate over every block id.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len()).map(|i| BlockId(i as u32))
    }

    fn data(&self, block: BlockId) -> &BlockData {
        &self.blocks[block.0 as usize]
    }
}

impl BlockInfra for BlockGraph {
    fn contains(&self, block: BlockId) -> bool {
        (block.0 as usize) < self.blocks.len()
    }

    fn block_length(&self, block: BlockId) -> f64 {
        self.data(block).length
    }

    fn block_entry(&self, block: BlockId) -> DetectorId {
        self.data(block).entry
    }

    fn block_exit(&self, block: BlockId) -> DetectorId {
        self.data(block).exit
    }

    fn blocks_ending_at(&self, detector: DetectorId) -> &[BlockId] {
        self.ending_at.get(&detector).map(Vec::as_slice).unwrap_or(&[])
    }

    fn blocks_starting_at(&self, detector: DetectorId) -> &[BlockId] {
        self.starting_at.get(&detector).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (BlockGraph, [BlockId; 4]) {
        // 0 -a-> 1 -b-> 2 -d-> 3
        //        1 -c-> 2
        let mut graph = BlockGraph::new();
        let a = graph.add_block(DetectorId(0), DetectorId(1), 100.0).unwrap();
        let b = graph.add_block(DetectorId(1), DetectorId(2), 200.0).unwrap();
        let c = graph.add_block(DetectorId(1), DetectorId(2), 300.0).unwrap();
        let d = graph.add_block(DetectorId(2), DetectorId(3), 400.0).unwrap();
        (graph, [a, b, c, d])
    }

    #[test]
    fn adjacency() {
        let (graph, [a, b, c, d]) = diamond();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.successors(a), &[b, c]);
        assert_eq!(graph.predecessors(d), &[b, c]);
        assert!(graph.successors(d).is_empty());
        assert!(graph.predecessors(a).is_empty());
        assert_eq!(graph.block_length(c), 300.0);
        assert_eq!(graph.block_entry(d), DetectorId(2));
        assert_eq!(graph.block_exit(d), DetectorId(3));
    }

    #[test]
    fn contains_only_issued_ids() {
        let (graph, _) = diamond();

        assert!(graph.contains(BlockId(3)));
        assert!(!graph.contains(BlockId(4)));
    }

    #[test]
    fn rejects_bad_lengths() {
        let mut graph = BlockGraph::new();

        assert!(matches!(
            graph.add_block(DetectorId(0), DetectorId(1), 0.0),
            Err(InfraError::InvalidLength(_))
        ));
        assert!(matches!(
            graph.add_block(DetectorId(0), DetectorId(1), f64::NAN),
            Err(InfraError::InvalidLength(_))
        ));
        assert!(graph.is_empty());
    }

    #[test]
    fn unknown_detector_has_no_blocks() {
        let (graph, _) = diamond();

        assert!(graph.blocks_starting_at(DetectorId(99)).is_empty());
        assert!(graph.blocks_ending_at(DetectorId(99)).is_empty());
    }
}
