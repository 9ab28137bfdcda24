//! Waypoints the train has to go through.

use serde::Serialize;

use crate::infra::{BlockId, BlockInfra, InfraError};

/// A position on a block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BlockLocation {
    /// Block holding the location.
    pub block: BlockId,

    /// Offset from the block start (m).
    pub offset: f64,
}

impl BlockLocation {
    /// Create a new location.
    pub fn new(block: BlockId, offset: f64) -> Self {
        Self { block, offset }
    }

    /// Check the location exists in `infra`.
    pub fn validate(&self, infra: &impl BlockInfra) -> Result<(), InfraError> {
        if !infra.contains(self.block) {
            return Err(InfraError::UnknownBlock(self.block));
        }
        let length = infra.block_length(self.block);
        if !(0.0..=length).contains(&self.offset) {
            return Err(InfraError::OffsetOutOfBlock {
                block: self.block,
                offset: self.offset,
                length,
            });
        }
        Ok(())
    }
}

/// A waypoint: any of its locations satisfies it.
///
/// The first step is the origin and the last the destination. A step with a
/// stop duration requires the train to stand still there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// Candidate locations.
    pub locations: Vec<BlockLocation>,

    /// Dwell time if the train stops here (s).
    pub stop_duration: Option<f64>,
}

impl Step {
    /// A waypoint the train passes through.
    pub fn pass(locations: Vec<BlockLocation>) -> Self {
        Self {
            locations,
            stop_duration: None,
        }
    }

    /// A waypoint the train stops at for `duration` seconds.
    pub fn stop(locations: Vec<BlockLocation>, duration: f64) -> Self {
        Self {
            locations,
            stop_duration: Some(duration),
        }
    }

    /// Returns true if the train stops at this step.
    pub fn is_stop(&self) -> bool {
        self.stop_duration.is_some()
    }

    /// Dwell time, zero when passing through.
    pub fn dwell(&self) -> f64 {
        self.stop_duration.unwrap_or(0.0)
    }

    /// Location of this step on `block` within `[from, to]`, if any.
    pub fn location_on(&self, block: BlockId, from: f64, to: f64) -> Option<&BlockLocation> {
        self.locations
            .iter()
            .filter(|l| l.block == block && l.offset >= from && l.offset <= to)
            .min_by(|a, b| a.offset.total_cmp(&b.offset))
    }

    /// Same step with every location at the start of a block moved to the
    /// end of the blocks leading into it.
    ///
    /// Edges never end where they start, so a waypoint on a block entry is
    /// only reachable as the exit of a predecessor. Locations on blocks
    /// without predecessors are kept.
    pub fn on_block_exits(&self, infra: &impl BlockInfra) -> Self {
        let mut locations = Vec::with_capacity(self.locations.len());
        for location in &self.locations {
            let predecessors = infra.predecessors(location.block);
            if location.offset > 0.0 || predecessors.is_empty() {
                locations.push(*location);
                continue;
            }
            for &block in predecessors {
                let moved = BlockLocation::new(block, infra.block_length(block));
                if !locations.contains(&moved) {
                    locations.push(moved);
                }
            }
        }
        Self {
            locations,
            stop_duration: self.stop_duration,
        }
    }
}
