//! Arena of search edges.
//!
//! Every edge keeps the index of the edge it extends, so a path is a chain
//! of parent indices back to an origin edge. Nodes are not stored: the
//! state at the end of an edge is derived on demand with
//! [`SearchGraph::end_node`].

use crate::infra::{BlockId, BlockInfra, DetectorId};
use crate::physics::{Envelope, TimeInterpolate};

use super::step::BlockLocation;

/// Offsets closer than this to a block end count as the block end (m).
const OFFSET_EPSILON: f64 = 1e-6;

/// Handle of an edge in a [`SearchGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub usize);

/// The train running over part of one block.
#[derive(Debug, Clone)]
pub struct SearchEdge {
    /// Edge this one extends, `None` at the origin.
    pub parent: Option<EdgeId>,

    /// Block being run over.
    pub block: BlockId,

    /// Offset on the block where the edge starts (m).
    pub start_offset: f64,

    /// Offset on the block where the edge ends (m).
    pub end_offset: f64,

    /// Offset of the block start along the block path (m).
    pub block_path_offset: f64,

    /// Distance travelled before the edge starts (m).
    pub path_offset: f64,

    /// Absolute time the head leaves `start_offset`, departure shift included (s).
    pub time_start: f64,

    /// Departure delay added while building this edge (s).
    pub added_delay: f64,

    /// Departure delay added since the origin, this edge included (s).
    pub total_departure_shift: f64,

    /// Maximum delay that can still be added without conflicts (s).
    pub maximum_added_delay: f64,

    /// Earliest reservation start after the train uses this edge (s).
    pub time_of_next_conflict: f64,

    /// Trajectory over the edge, allowance included.
    pub envelope: Envelope,

    /// Index of the last waypoint satisfied at the edge end.
    pub waypoint_index: usize,

    /// Dwell time if the edge ends at a stop (s).
    pub stop_duration: Option<f64>,

    /// Blocks committed after this one to settle its availability.
    pub lookahead: Vec<BlockId>,
}

impl SearchEdge {
    /// Length of the edge (m).
    pub fn length(&self) -> f64 {
        self.end_offset - self.start_offset
    }

    /// Absolute time the head reaches the end of the edge (s).
    pub fn time_end(&self) -> f64 {
        self.time_start + self.envelope.total_time()
    }
}

/// State of the train at the end of an edge, or at the origin.
#[derive(Debug, Clone)]
pub struct SearchNode {
    /// Arrival time (s).
    pub time: f64,

    /// Arrival speed (m/s).
    pub speed: f64,

    /// Detector between the current and the previous block, if the node
    /// sits on one.
    pub detector: Option<DetectorId>,

    /// Departure delay added so far (s).
    pub total_prev_added_delay: f64,

    /// Delay that can still be added without conflicts (s).
    pub maximum_added_delay: f64,

    /// Edge that produced this node.
    pub previous_edge: Option<EdgeId>,

    /// Index of the last waypoint satisfied.
    pub waypoint_index: usize,

    /// Position when the node is inside a block.
    pub location_on_block: Option<BlockLocation>,

    /// Dwell time when the node is a stop (s).
    pub stop_duration: Option<f64>,

    /// Blocks already committed ahead.
    pub lookahead: Vec<BlockId>,
}

impl SearchNode {
    /// Time the train leaves this node (s).
    pub fn departure_time(&self) -> f64 {
        self.time + self.stop_duration.unwrap_or(0.0)
    }
}

/// Arena owning every edge created by a search.
#[derive(Debug, Clone, Default)]
pub struct SearchGraph {
    edges: Vec<SearchEdge>,
}

impl SearchGraph {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an edge and return its handle.
    pub fn push(&mut self, edge: SearchEdge) -> EdgeId {
        self.edges.push(edge);
        EdgeId(self.edges.len() - 1)
    }

    /// The edge behind `id`.
    pub fn edge(&self, id: EdgeId) -> &SearchEdge {
        &self.edges[id.0]
    }

    /// Number of edges created.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns true if no edge was created.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Edges from the origin to `id`, in travel order.
    pub fn chain(&self, id: EdgeId) -> Vec<EdgeId> {
        let mut out = vec![id];
        let mut current = self.edge(id).parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.edge(parent).parent;
        }
        out.reverse();
        out
    }

    /// Blocks run over from the origin to the end of `id`.
    pub fn path_blocks(&self, id: EdgeId) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = Vec::new();
        for edge_id in self.chain(id) {
            let edge = self.edge(edge_id);
            let continues = self
                .edge(edge_id)
                .parent
                .is_some_and(|p| self.edge(p).block == edge.block && edge.start_offset > 0.0);
            if !continues {
                blocks.push(edge.block);
            }
        }
        blocks
    }

    /// State of the train at the end of `id`.
    pub fn end_node(&self, id: EdgeId, infra: &impl BlockInfra) -> SearchNode {
        let edge = self.edge(id);
        let at_block_end = edge.end_offset >= infra.block_length(edge.block) - OFFSET_EPSILON;
        let (detector, location_on_block) = if at_block_end {
            (Some(infra.block_exit(edge.block)), None)
        } else {
            (None, Some(BlockLocation::new(edge.block, edge.end_offset)))
        };

        SearchNode {
            time: edge.time_end(),
            speed: edge.envelope.end_speed(),
            detector,
            total_prev_added_delay: edge.total_departure_shift,
            maximum_added_delay: edge.maximum_added_delay,
            previous_edge: Some(id),
            waypoint_index: edge.waypoint_index,
            location_on_block,
            stop_duration: edge.stop_duration,
            lookahead: edge.lookahead.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::BlockGraph;

    fn edge(parent: Option<EdgeId>, block: BlockId, start: f64, end: f64) -> SearchEdge {
        SearchEdge {
            parent,
            block,
            start_offset: start,
            end_offset: end,
            block_path_offset: 0.0,
            path_offset: 0.0,
            time_start: 100.0,
            added_delay: 0.0,
            total_departure_shift: 0.0,
            maximum_added_delay: 60.0,
            time_of_next_conflict: f64::INFINITY,
            envelope: Envelope::constant_speed(end - start, 10.0).unwrap(),
            waypoint_index: 0,
            stop_duration: None,
            lookahead: Vec::new(),
        }
    }

    fn graph() -> (BlockGraph, BlockId, BlockId) {
        let mut infra = BlockGraph::new();
        let a = infra.add_block(DetectorId(0), DetectorId(1), 1000.0).unwrap();
        let b = infra.add_block(DetectorId(1), DetectorId(2), 1000.0).unwrap();
        (infra, a, b)
    }

    #[test]
    fn chain_follows_parents() {
        let (_, a, b) = graph();
        let mut arena = SearchGraph::new();
        let first = arena.push(edge(None, a, 0.0, 400.0));
        let second = arena.push(edge(Some(first), a, 400.0, 1000.0));
        let third = arena.push(edge(Some(second), b, 0.0, 1000.0));
        // a sibling branch does not show up
        arena.push(edge(Some(first), a, 400.0, 1000.0));

        assert_eq!(arena.chain(third), vec![first, second, third]);
        assert_eq!(arena.path_blocks(third), vec![a, b]);
        assert_eq!(arena.len(), 4);
    }

    #[test]
    fn end_node_mid_block() {
        let (infra, a, _) = graph();
        let mut arena = SearchGraph::new();
        let mut stop = edge(None, a, 0.0, 400.0);
        stop.stop_duration = Some(120.0);
        let id = arena.push(stop);

        let node = arena.end_node(id, &infra);
        assert_eq!(node.location_on_block, Some(BlockLocation::new(a, 400.0)));
        assert_eq!(node.detector, None);
        assert!((node.time - 140.0).abs() < 1e-9);
        assert!((node.departure_time() - 260.0).abs() < 1e-9);
        assert_eq!(node.previous_edge, Some(id));
    }

    #[test]
    fn end_node_on_detector() {
        let (infra, a, _) = graph();
        let mut arena = SearchGraph::new();
        let id = arena.push(edge(None, a, 0.0, 1000.0));

        let node = arena.end_node(id, &infra);
        assert_eq!(node.location_on_block, None);
        assert_eq!(node.detector, Some(DetectorId(1)));
        assert_eq!(node.maximum_added_delay, 60.0);
    }
}
