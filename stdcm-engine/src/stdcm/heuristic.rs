//! Backward cost-to-go heuristic.
//!
//! Before the forward search starts, a reverse best-first relaxation from
//! the destination computes, for every block and every number of waypoints
//! already passed, a lower bound on the time left to reach the destination
//! from the start of that block. Traversal times use the rolling stock's
//! maximum speed and ignore every other limit, so the bound never exceeds
//! the true running time.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use tracing::debug;

use crate::infra::{BlockId, BlockInfra};
use crate::physics::RollingStock;

use super::step::Step;

/// A block waiting to be settled by the reverse relaxation.
#[derive(Debug, Clone, Copy)]
struct PendingBlock {
    block: BlockId,
    /// Index of the next step to reach from the start of the block.
    step_index: usize,
    /// Time left from the block start to the destination (s).
    remaining: f64,
    /// Whether settling this entry explores predecessors.
    expand: bool,
}

impl PartialEq for PendingBlock {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingBlock {}

impl PartialOrd for PendingBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingBlock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.remaining.total_cmp(&other.remaining)
    }
}

/// Remaining-time lower bounds, one map per waypoint boundary.
#[derive(Debug, Clone)]
pub struct StdcmHeuristic {
    /// `maps[i]` holds bounds for a train that has passed `i` waypoints
    /// after the origin.
    maps: Vec<HashMap<BlockId, f64>>,
    rolling_stock: RollingStock,
    max_departure_delay: f64,
}

impl StdcmHeuristic {
    /// Run the reverse relaxation for `steps`.
    ///
    /// Branches whose remaining time exceeds `max_run_time` are pruned.
    pub fn build(
        infra: &impl BlockInfra,
        steps: &[Step],
        max_run_time: f64,
        rolling_stock: &RollingStock,
        max_departure_delay: f64,
    ) -> Self {
        let mut heuristic = Self {
            maps: vec![HashMap::new(); steps.len().saturating_sub(1).max(1)],
            rolling_stock: rolling_stock.clone(),
            max_departure_delay,
        };
        let Some(destination) = steps.last() else {
            return heuristic;
        };

        let mut queue = BinaryHeap::new();
        for location in &destination.locations {
            let pending = heuristic.pending_blocks(
                infra,
                steps,
                location.block,
                Some(location.offset),
                steps.len() - 1,
                0.0,
            );
            queue.extend(pending.into_iter().map(Reverse));
        }

        let mut settled = 0usize;
        while let Some(Reverse(current)) = queue.pop() {
            let index = current.step_index.saturating_sub(1);
            if heuristic.maps[index].contains_key(&current.block) {
                continue;
            }
            heuristic.maps[index].insert(current.block, current.remaining);
            settled += 1;

            if current.step_index == 0 || !current.expand {
                continue;
            }
            for &predecessor in infra.predecessors(current.block) {
                let pending = heuristic.pending_blocks(
                    infra,
                    steps,
                    predecessor,
                    None,
                    current.step_index,
                    current.remaining,
                );
                // Pruning: the search never accepts slower paths anyway
                queue.extend(
                    pending
                        .into_iter()
                        .filter(|p| p.remaining <= max_run_time)
                        .map(Reverse),
                );
            }
        }

        debug!(settled, waypoints = steps.len(), "Heuristic built");
        heuristic
    }

    /// Pending entries for `block`, whose part up to `offset` (the whole
    /// block when `None`) leads to step `current_index` with `remaining`
    /// seconds left from there.
    ///
    /// Steps located on the block before `offset` are passed while crossing
    /// it, so the returned entry targets an earlier step and owes their stop
    /// durations. The block is also settled for each passed intermediate
    /// step, without its dwell, for trains that pass it on this very block.
    fn pending_blocks(
        &self,
        infra: &impl BlockInfra,
        steps: &[Step],
        block: BlockId,
        offset: Option<f64>,
        current_index: usize,
        remaining: f64,
    ) -> Vec<PendingBlock> {
        let actual_offset = offset.unwrap_or_else(|| infra.block_length(block));
        let block_time = self.rolling_stock.min_time(actual_offset);

        let mut out = Vec::new();
        let mut index = current_index;
        let mut remaining = remaining;
        while index > 0 {
            let step = &steps[index - 1];
            if step.location_on(block, 0.0, actual_offset).is_none() {
                break;
            }
            if index - 1 > 0 {
                out.push(PendingBlock {
                    block,
                    step_index: index,
                    remaining: remaining + block_time,
                    expand: false,
                });
            }
            remaining += step.dwell();
            index -= 1;
        }
        out.push(PendingBlock {
            block,
            step_index: index,
            remaining: remaining + block_time,
            expand: true,
        });
        out
    }

    /// Number of waypoint boundaries, one per possible count of passed
    /// intermediate waypoints.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    /// Returns true if there is no boundary at all.
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Raw lower bound on the time left from the start of `block`, for a
    /// train that has passed `n_passed_steps` waypoints after the origin.
    ///
    /// Falls back to bounds computed for fewer passed waypoints.
    pub fn remaining_time(&self, n_passed_steps: usize, block: BlockId) -> Option<f64> {
        let top = n_passed_steps.min(self.maps.len().saturating_sub(1));
        (0..=top)
            .rev()
            .find_map(|i| self.maps.get(i).and_then(|m| m.get(&block)).copied())
    }

    /// Heuristic cost left for a train at `block_offset` on `block`, in
    /// search cost units (seconds weighted by the maximum departure delay).
    ///
    /// Returns `f64::INFINITY` when no bound is known.
    pub fn estimate(&self, n_passed_steps: usize, block: BlockId, block_offset: f64) -> f64 {
        match self.remaining_time(n_passed_steps, block) {
            Some(remaining) => {
                (remaining - self.rolling_stock.min_time(block_offset)) * self.max_departure_delay
            }
            None => f64::INFINITY,
        }
    }

    /// The heuristic for trains that have passed `n_passed_steps` waypoints.
    pub fn waypoint(&self, n_passed_steps: usize) -> WaypointHeuristic<'_> {
        WaypointHeuristic {
            heuristic: self,
            n_passed_steps,
        }
    }
}

/// Heuristic of one waypoint boundary.
#[derive(Debug, Clone, Copy)]
pub struct WaypointHeuristic<'a> {
    heuristic: &'a StdcmHeuristic,
    n_passed_steps: usize,
}

impl WaypointHeuristic<'_> {
    /// See [`StdcmHeuristic::estimate`].
    pub fn estimate(&self, block: BlockId, block_offset: f64) -> f64 {
        self.heuristic
            .estimate(self.n_passed_steps, block, block_offset)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::infra::{BlockGraph, DetectorId};
    use crate::stdcm::BlockLocation;
    use proptest::prelude::*;

    const ORIGIN_ENTRY: u32 = 100;

    /// Random graph whose block 0 is the only one leaving `ORIGIN_ENTRY`,
    /// plus a destination block index and a fraction along it.
    fn graph_strategy() -> impl Strategy<Value = (Vec<(u32, u32, f64)>, usize, f64)> {
        let block = (0u32..5, 0u32..5, 10.0f64..2000.0)
            .prop_filter("no self loops", |(entry, exit, _)| entry != exit);
        (
            (0u32..5, 10.0f64..2000.0),
            prop::collection::vec(block, 1..10),
        )
            .prop_flat_map(|((first_exit, first_len), rest)| {
                let mut blocks = vec![(ORIGIN_ENTRY, first_exit, first_len)];
                blocks.extend(rest);
                let n = blocks.len();
                (Just(blocks), 1..n, 0.0f64..=1.0)
            })
    }

    /// Shortest distance from each block start to the destination location.
    fn brute_force(graph: &BlockGraph, destination: BlockId, dest_offset: f64) -> Vec<f64> {
        let n = graph.len();
        let mut dist = vec![f64::INFINITY; n];
        for _ in 0..=n {
            for block in graph.block_ids() {
                let via_next = graph
                    .successors(block)
                    .iter()
                    .map(|s| dist[s.0 as usize])
                    .fold(f64::INFINITY, f64::min);
                let mut best = graph.block_length(block) + via_next;
                if block == destination {
                    best = best.min(dest_offset);
                }
                dist[block.0 as usize] = dist[block.0 as usize].min(best);
            }
        }
        dist
    }

    proptest! {
        #[test]
        fn bound_never_exceeds_shortest_path((blocks, dest_idx, frac) in graph_strategy()) {
            let mut graph = BlockGraph::new();
            for &(entry, exit, length) in &blocks {
                graph.add_block(DetectorId(entry), DetectorId(exit), length).unwrap();
            }
            let destination = BlockId(dest_idx as u32);
            let dest_offset = graph.block_length(destination) * frac;
            let steps = [
                Step::pass(vec![BlockLocation::new(BlockId(0), 0.0)]),
                Step::stop(vec![BlockLocation::new(destination, dest_offset)], 0.0),
            ];
            let rs = RollingStock::new(50.0, 40.0, 1.0, 1.0);
            let heuristic = StdcmHeuristic::build(&graph, &steps, 1e9, &rs, 1.0);
            let truth = brute_force(&graph, destination, dest_offset);

            for block in graph.block_ids() {
                let bound = heuristic.estimate(0, block, 0.0);
                let exact = truth[block.0 as usize] / rs.max_speed;
                if exact.is_finite() {
                    prop_assert!(bound <= exact + 1e-6, "{block}: {bound} > {exact}");
                    // nothing but the origin block can lead back into it
                    prop_assert!(bound >= exact - 1e-6, "{block}: {bound} < {exact}");
                } else {
                    prop_assert_eq!(bound, f64::INFINITY);
                }
            }
        }
    }
}
