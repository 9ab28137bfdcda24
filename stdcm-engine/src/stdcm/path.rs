//! The path found by a search, as handed to the final envelope build.

use serde::Serialize;

use crate::infra::BlockId;
use crate::physics::{Envelope, TimeInterpolate, TrainStop};

/// Part of the path run over by one search edge.
#[derive(Debug, Clone, Serialize)]
pub struct ExploredRange {
    /// Block run over.
    pub block: BlockId,

    /// Start offset on the block (m).
    pub begin: f64,

    /// End offset on the block (m).
    pub end: f64,

    /// Distance travelled from the origin to `begin` (m).
    pub path_offset: f64,

    /// Time since departure when the head leaves `begin` (s).
    pub time_start: f64,

    /// Trajectory used while exploring.
    #[serde(skip)]
    pub envelope: Envelope,
}

impl ExploredRange {
    /// Length of the range (m).
    pub fn length(&self) -> f64 {
        self.end - self.begin
    }

    /// Distance travelled from the origin to `end` (m).
    pub fn path_end(&self) -> f64 {
        self.path_offset + self.length()
    }
}

/// Blocks, stops and exploration timings from origin to destination.
///
/// Offsets named "travelled" are measured from the origin location, while
/// the block path starts at the entry of the first block; they differ by
/// `origin_offset`.
#[derive(Debug, Clone, Serialize)]
pub struct StdcmPath {
    /// Blocks in travel order.
    pub blocks: Vec<BlockId>,

    /// Explored ranges in travel order.
    pub ranges: Vec<ExploredRange>,

    /// Stops in travelled offsets, destination included.
    pub stops: Vec<TrainStop>,

    /// Offset of the origin on the first block (m).
    pub origin_offset: f64,

    /// Distance from origin to destination (m).
    pub length: f64,
}

impl StdcmPath {
    /// Time since departure at which the exploration passed `offset`
    /// (travelled metres).
    ///
    /// At a stop this is the arrival time.
    pub fn time_at(&self, offset: f64) -> f64 {
        let index = self
            .ranges
            .partition_point(|r| r.path_end() < offset)
            .min(self.ranges.len().saturating_sub(1));
        match self.ranges.get(index) {
            Some(range) => {
                range.time_start
                    + range
                        .envelope
                        .interpolate_total_time_clamp(offset - range.path_offset)
            }
            None => 0.0,
        }
    }

    /// Convert a block path offset to a travelled offset, clamped to the path.
    pub fn travelled_offset(&self, block_path_offset: f64) -> f64 {
        (block_path_offset - self.origin_offset).clamp(0.0, self.length)
    }

    /// Total dwell time of the stops strictly before the destination (s).
    pub fn intermediate_dwell(&self) -> f64 {
        self.stops
            .iter()
            .filter(|s| s.position < self.length)
            .map(|s| s.duration)
            .sum()
    }
}
