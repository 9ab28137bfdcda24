//! A* search over blocks and departure times.
//!
//! Each edge runs the train over part of one block. Building an edge
//! simulates it, asks the availability oracle whether it conflicts, and
//! shifts the departure when it does. The cost of a path is its running
//! time weighted by the maximum departure delay, plus the departure shift,
//! so any gain in running time beats any departure shift.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use serde::Serialize;
use tracing::{debug, info, info_span, trace};

use crate::conflicts::{Availability, BlockAvailability};
use crate::infra::{BlockId, BlockInfra};
use crate::physics::{
    AllowanceDistribution, AllowanceRange, AllowanceValue, Envelope, EnvelopeWithStops,
    RollingStock, SimContext, Simulator, TimeInterpolate, TrainStop, apply_allowance,
};

use super::config::StdcmConfig;
use super::error::StdcmError;
use super::graph::{EdgeId, SearchEdge, SearchGraph, SearchNode};
use super::heuristic::StdcmHeuristic;
use super::path::{ExploredRange, StdcmPath};
use super::standard_allowance::{FinalEnvelope, build_final_envelope};
use super::step::Step;

/// Tolerance on times (s).
const TIME_EPSILON: f64 = 1e-6;

/// Tolerance on offsets (m).
const OFFSET_EPSILON: f64 = 1e-6;

/// Delay past the end of an opening used to look for the next one (s).
const OPENING_STEP: f64 = 1e-3;

/// Request for a train path.
#[derive(Debug, Clone)]
pub struct StdcmRequest {
    /// Waypoints, from origin to destination.
    pub steps: Vec<Step>,

    /// The train to route.
    pub rolling_stock: RollingStock,

    /// Earliest departure time (s).
    pub departure_time: f64,

    /// Slack added on top of the fastest trajectory.
    pub standard_allowance: Option<AllowanceValue>,
}

impl StdcmRequest {
    /// Create a new request without standard allowance.
    pub fn new(steps: Vec<Step>, rolling_stock: RollingStock, departure_time: f64) -> Self {
        Self {
            steps,
            rolling_stock,
            departure_time,
            standard_allowance: None,
        }
    }

    /// Add a standard allowance to the request.
    pub fn with_standard_allowance(mut self, allowance: AllowanceValue) -> Self {
        self.standard_allowance = Some(allowance);
        self
    }

    /// Validate the request against `infra`.
    pub fn validate(&self, infra: &impl BlockInfra) -> Result<(), StdcmError> {
        if self.steps.len() < 2 {
            return Err(StdcmError::InvalidRequest(
                "an origin and a destination are required".to_string(),
            ));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.locations.is_empty() {
                return Err(StdcmError::InvalidRequest(format!(
                    "step {index} has no location"
                )));
            }
            for location in &step.locations {
                location.validate(infra)?;
            }
            if step
                .stop_duration
                .is_some_and(|d| !(d >= 0.0) || !d.is_finite())
            {
                return Err(StdcmError::InvalidRequest(format!(
                    "step {index} has an invalid stop duration"
                )));
            }
        }

        self.rolling_stock.validate()?;

        if !self.departure_time.is_finite() {
            return Err(StdcmError::InvalidRequest(
                "departure time must be finite".to_string(),
            ));
        }
        if let Some(allowance) = self.standard_allowance {
            let value = match allowance {
                AllowanceValue::Percentage(value) | AllowanceValue::TimePerDistance(value) => value,
            };
            if !(value >= 0.0) || !value.is_finite() {
                return Err(StdcmError::InvalidRequest(
                    "standard allowance must be finite and non-negative".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A conflict-free train path.
#[derive(Debug, Clone, Serialize)]
pub struct StdcmResult {
    /// Blocks, stops and exploration timings.
    pub path: StdcmPath,

    /// Departure time, shift included (s).
    pub departure_time: f64,

    /// Delay added to the requested departure (s).
    pub departure_shift: f64,

    /// Fastest trajectory over the path, before any allowance.
    #[serde(skip)]
    pub max_speed_envelope: Envelope,

    /// Trajectory to run.
    pub envelope: FinalEnvelope,

    /// Number of edges created by the search.
    pub explored_edges: usize,
}

impl StdcmResult {
    /// Time the head reaches the destination (s).
    pub fn arrival_time(&self) -> f64 {
        self.departure_time + self.envelope.envelope.total_time() + self.path.intermediate_dwell()
    }

    /// Running time from departure to arrival, dwell times included (s).
    pub fn running_time(&self) -> f64 {
        self.arrival_time() - self.departure_time
    }
}

/// An edge waiting in the open set.
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    priority: f64,
    cost: f64,
    edge: EdgeId,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Creation order breaks ties.
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| self.edge.cmp(&other.edge))
    }
}

/// States already expanded, to skip dominated ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VisitKey {
    block: BlockId,
    offset_mm: i64,
    waypoint_index: usize,
    lookahead: Vec<BlockId>,
}

/// Where an edge built from a given start ends.
#[derive(Debug, Clone, Copy)]
struct Extent {
    end_offset: f64,
    waypoint_index: usize,
    stop_duration: Option<f64>,
}

/// A section of path to check against the oracle.
struct Section<'a> {
    blocks: &'a [BlockId],
    start: f64,
    end: f64,
    envelope: &'a dyn TimeInterpolate,
    time_start: f64,
}

/// A departure delay under which a section is available.
#[derive(Debug, Clone, Copy)]
struct Opening {
    added_delay: f64,
    maximum_delay: f64,
    time_of_next_conflict: f64,
}

/// Outcome of the departure shift loop for one section.
#[derive(Debug, Clone)]
enum Resolution {
    /// Openings within the delay budget, earliest first. Empty when the
    /// branch is pruned.
    Openings(Vec<Opening>),
    NeedsLookahead,
}

/// Mutable state of one search.
struct Search<'r> {
    request: &'r StdcmRequest,
    /// Waypoints with block entries moved to block exits.
    steps: Vec<Step>,
    heuristic: StdcmHeuristic,
    graph: SearchGraph,
    queue: BinaryHeap<Reverse<QueueEntry>>,
    visited: HashMap<VisitKey, Vec<(f64, f64)>>,
}

impl Search<'_> {
    fn reaches_destination(&self, edge: &SearchEdge) -> bool {
        edge.waypoint_index + 1 >= self.steps.len()
    }

    /// Store `edge` and queue it unless it cannot reach the destination.
    fn push(&mut self, edge: SearchEdge, config: &StdcmConfig) {
        let running_time =
            edge.time_end() - self.request.departure_time - edge.total_departure_shift;
        let cost = running_time * config.max_departure_delay + edge.total_departure_shift;
        let remaining = if self.reaches_destination(&edge) {
            0.0
        } else {
            self.heuristic
                .estimate(edge.waypoint_index, edge.block, edge.end_offset)
        };
        if !remaining.is_finite() {
            trace!(block = %edge.block, "Destination unreachable from block");
            return;
        }

        let edge = self.graph.push(edge);
        self.queue.push(Reverse(QueueEntry {
            priority: cost + remaining,
            cost,
            edge,
        }));
    }

    /// Record the state at the end of `id`. Returns false if an earlier
    /// state at the same place arrived no later and can wait as long.
    fn visit(&mut self, id: EdgeId, node: &SearchNode) -> bool {
        let edge = self.graph.edge(id);
        let key = VisitKey {
            block: edge.block,
            offset_mm: (edge.end_offset * 1000.0).round() as i64,
            waypoint_index: node.waypoint_index,
            lookahead: node.lookahead.clone(),
        };
        let seen = self.visited.entry(key).or_default();
        let latest = node.time + node.maximum_added_delay;
        let dominated = seen.iter().any(|&(time, slack)| {
            time <= node.time + TIME_EPSILON && time + slack >= latest - TIME_EPSILON
        });
        if dominated {
            return false;
        }
        seen.push((node.time, node.maximum_added_delay));
        true
    }
}

/// Train path planner.
///
/// A planner borrows everything it reads and keeps no state between
/// searches, so one planner can serve concurrent searches.
pub struct Planner<'a, I, A, S> {
    infra: &'a I,
    availability: &'a A,
    simulator: &'a S,
    config: &'a StdcmConfig,
}

impl<'a, I: BlockInfra, A: BlockAvailability, S: Simulator> Planner<'a, I, A, S> {
    /// Create a new planner.
    pub fn new(
        infra: &'a I,
        availability: &'a A,
        simulator: &'a S,
        config: &'a StdcmConfig,
    ) -> Self {
        Self {
            infra,
            availability,
            simulator,
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &StdcmConfig {
        self.config
    }

    /// Search for the conflict-free path with the lowest cost.
    pub fn search(&self, request: &StdcmRequest) -> Result<StdcmResult, StdcmError> {
        self.config
            .validate()
            .map_err(|e| StdcmError::InvalidRequest(e.to_string()))?;
        request.validate(self.infra)?;

        let _span = info_span!(
            "stdcm_search",
            steps = request.steps.len(),
            departure_time = request.departure_time
        )
        .entered();

        let steps: Vec<Step> = request
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                if index == 0 {
                    step.clone()
                } else {
                    step.on_block_exits(self.infra)
                }
            })
            .collect();
        let heuristic = StdcmHeuristic::build(
            self.infra,
            &steps,
            self.config.max_run_time,
            &request.rolling_stock,
            self.config.max_departure_delay,
        );
        let mut search = Search {
            request,
            steps,
            heuristic,
            graph: SearchGraph::new(),
            queue: BinaryHeap::new(),
            visited: HashMap::new(),
        };

        for node in self.initial_nodes(request) {
            self.expand(&mut search, &node)?;
        }

        while let Some(Reverse(entry)) = search.queue.pop() {
            if search.reaches_destination(search.graph.edge(entry.edge)) {
                info!(
                    explored = search.graph.len(),
                    cost = entry.cost,
                    "Destination reached"
                );
                return self.finish(request, &search.graph, entry.edge);
            }
            if search.graph.len() >= self.config.max_explored_edges {
                info!(explored = search.graph.len(), "Exploration limit reached");
                break;
            }

            let node = search.graph.end_node(entry.edge, self.infra);
            if !search.visit(entry.edge, &node) {
                trace!(edge = entry.edge.0, "Dominated state skipped");
                continue;
            }
            self.expand(&mut search, &node)?;
        }

        info!(explored = search.graph.len(), "No path found");
        Err(StdcmError::NoPathFound)
    }

    fn initial_nodes(&self, request: &StdcmRequest) -> Vec<SearchNode> {
        request.steps[0]
            .locations
            .iter()
            .map(|&location| SearchNode {
                time: request.departure_time,
                speed: 0.0,
                detector: None,
                total_prev_added_delay: 0.0,
                maximum_added_delay: self.config.max_departure_delay,
                previous_edge: None,
                waypoint_index: 0,
                location_on_block: Some(location),
                stop_duration: None,
                lookahead: Vec::new(),
            })
            .collect()
    }

    /// Build every edge leaving `node`.
    fn expand(&self, search: &mut Search<'_>, node: &SearchNode) -> Result<(), StdcmError> {
        let starts: Vec<(BlockId, f64, Vec<BlockId>)> =
            match (node.location_on_block, node.previous_edge) {
                (Some(location), _) => {
                    vec![(location.block, location.offset, node.lookahead.clone())]
                }
                (None, Some(previous)) => match node.lookahead.split_first() {
                    Some((&next, rest)) => vec![(next, 0.0, rest.to_vec())],
                    None => {
                        let block = search.graph.edge(previous).block;
                        self.infra
                            .successors(block)
                            .iter()
                            .map(|&next| (next, 0.0, Vec::new()))
                            .collect()
                    }
                },
                (None, None) => Vec::new(),
            };

        for (block, start_offset, lookahead) in starts {
            self.build_edges(search, node, block, start_offset, lookahead)?;
        }
        Ok(())
    }

    /// Build the edges running over `block` from `start_offset`, one per
    /// lookahead that settles their availability.
    fn build_edges(
        &self,
        search: &mut Search<'_>,
        node: &SearchNode,
        block: BlockId,
        start_offset: f64,
        lookahead: Vec<BlockId>,
    ) -> Result<(), StdcmError> {
        let request = search.request;
        let extent = self.extent(&search.steps, block, start_offset, node.waypoint_index);
        let length = extent.end_offset - start_offset;
        if length <= OFFSET_EPSILON {
            return Ok(());
        }

        let initial_speed = if node.stop_duration.is_some() {
            0.0
        } else {
            node.speed
        };
        let context =
            SimContext::new(length, initial_speed).stopping_at_end(extent.stop_duration.is_some());
        let envelope = self.simulator.simulate(&request.rolling_stock, &context)?;
        let envelope = pad(envelope, request.standard_allowance)?;
        // The train holds its blocks until it leaves the stop.
        let dwell: Vec<TrainStop> = extent
            .stop_duration
            .filter(|&d| d > 0.0)
            .map(|d| TrainStop::new(length, d))
            .into_iter()
            .collect();
        let checked = EnvelopeWithStops::new(&envelope, &dwell);

        let (mut blocks, block_path_offset, path_offset) = match node.previous_edge {
            None => (Vec::new(), 0.0, 0.0),
            Some(previous) => {
                let prev = search.graph.edge(previous);
                let mut blocks = search.graph.path_blocks(previous);
                let travelled = prev.path_offset + prev.length();
                if node.location_on_block.is_some() {
                    // continuing on the same block
                    blocks.pop();
                    (blocks, prev.block_path_offset, travelled)
                } else {
                    let offset = prev.block_path_offset + self.infra.block_length(prev.block);
                    (blocks, offset, travelled)
                }
            }
        };
        blocks.push(block);
        let prefix_len = blocks.len();
        let time_start = node.departure_time();

        let mut pending = vec![lookahead];
        while let Some(lookahead) = pending.pop() {
            blocks.truncate(prefix_len);
            blocks.extend_from_slice(&lookahead);
            let section = Section {
                blocks: &blocks,
                start: block_path_offset + start_offset,
                end: block_path_offset + extent.end_offset,
                envelope: &checked,
                time_start,
            };

            match self.resolve_delay(&section, node) {
                Resolution::Openings(openings) => {
                    for opening in openings {
                        let Opening {
                            added_delay,
                            maximum_delay,
                            time_of_next_conflict,
                        } = opening;
                        let edge = SearchEdge {
                            parent: node.previous_edge,
                            block,
                            start_offset,
                            end_offset: extent.end_offset,
                            block_path_offset,
                            path_offset,
                            time_start: time_start + added_delay,
                            added_delay,
                            total_departure_shift: node.total_prev_added_delay + added_delay,
                            maximum_added_delay: (node.maximum_added_delay - added_delay)
                                .min(maximum_delay),
                            time_of_next_conflict,
                            envelope: envelope.clone(),
                            waypoint_index: extent.waypoint_index,
                            stop_duration: extent.stop_duration,
                            lookahead: lookahead.clone(),
                        };
                        let running_time =
                            edge.time_end() - request.departure_time - edge.total_departure_shift;
                        if running_time > self.config.max_run_time {
                            trace!(block = %block, running_time, "Run time exceeded");
                            continue;
                        }
                        trace!(
                            block = %block,
                            start_offset,
                            end_offset = extent.end_offset,
                            added_delay,
                            "Edge created"
                        );
                        search.push(edge, self.config);
                    }
                }
                Resolution::NeedsLookahead => {
                    if lookahead.len() >= self.config.max_lookahead_blocks {
                        debug!(block = %block, "Lookahead limit reached");
                        continue;
                    }
                    let Some(&last) = blocks.last() else {
                        continue;
                    };
                    for &next in self.infra.successors(last) {
                        let mut extended = lookahead.clone();
                        extended.push(next);
                        pending.push(extended);
                    }
                }
            }
        }
        Ok(())
    }

    /// Departure shifts under which `section` is available, within the
    /// delay budget of `node`.
    ///
    /// The first opening is the smallest shift. Each later one starts after
    /// the reservation that closes the previous one, so a train blocked
    /// further on can still wait for the next gap.
    fn resolve_delay(&self, section: &Section<'_>, node: &SearchNode) -> Resolution {
        let mut openings = Vec::new();
        let mut added_delay = 0.0;
        for _ in 0..self.config.max_delay_retries {
            if !self.fits_budget(node, added_delay) {
                trace!(
                    delay = added_delay,
                    budget = node.maximum_added_delay,
                    "Delay does not fit"
                );
                break;
            }
            let availability = self.availability.get_availability(
                section.blocks,
                section.start,
                section.end,
                section.envelope,
                section.time_start + added_delay,
            );
            match availability {
                Availability::Available {
                    maximum_delay,
                    time_of_next_conflict,
                } => {
                    openings.push(Opening {
                        added_delay,
                        maximum_delay,
                        time_of_next_conflict,
                    });
                    if !maximum_delay.is_finite() {
                        break;
                    }
                    added_delay += maximum_delay + OPENING_STEP;
                }
                Availability::Unavailable { duration, .. } => {
                    if duration <= 0.0 {
                        break;
                    }
                    added_delay += duration;
                }
                Availability::NotEnoughLookahead => return Resolution::NeedsLookahead,
            }
        }
        Resolution::Openings(openings)
    }

    fn fits_budget(&self, node: &SearchNode, added_delay: f64) -> bool {
        added_delay <= node.maximum_added_delay + TIME_EPSILON
            && node.total_prev_added_delay + added_delay
                <= self.config.max_departure_delay + TIME_EPSILON
    }

    /// Find where an edge over `block` from `start_offset` ends.
    ///
    /// An edge ends at the next stop or at the destination, otherwise at the
    /// block end. Waypoints passed through on the way are counted.
    fn extent(
        &self,
        steps: &[Step],
        block: BlockId,
        start_offset: f64,
        waypoint_index: usize,
    ) -> Extent {
        let block_length = self.infra.block_length(block);
        let last = steps.len() - 1;
        let mut index = waypoint_index;
        let mut cursor = start_offset;

        while index < last {
            let step = &steps[index + 1];
            let ends_edge = step.is_stop() || index + 1 == last;
            let from = if ends_edge {
                cursor.max(start_offset + OFFSET_EPSILON)
            } else {
                cursor
            };
            let Some(location) = step.location_on(block, from, block_length) else {
                break;
            };
            if ends_edge {
                return Extent {
                    end_offset: location.offset,
                    waypoint_index: index + 1,
                    stop_duration: Some(step.dwell()),
                };
            }
            cursor = location.offset;
            index += 1;
        }

        Extent {
            end_offset: block_length,
            waypoint_index: index,
            stop_duration: None,
        }
    }

    /// Rebuild the path ending with `id` and compute its final trajectory.
    fn finish(
        &self,
        request: &StdcmRequest,
        graph: &SearchGraph,
        id: EdgeId,
    ) -> Result<StdcmResult, StdcmError> {
        let edges: Vec<&SearchEdge> =
            graph.chain(id).into_iter().map(|e| graph.edge(e)).collect();
        let (Some(first), Some(last)) = (edges.first(), edges.last()) else {
            return Err(StdcmError::NoPathFound);
        };

        let departure_shift = last.total_departure_shift;
        let departure_time = request.departure_time + departure_shift;
        let ranges = edges
            .iter()
            .map(|edge| ExploredRange {
                block: edge.block,
                begin: edge.start_offset,
                end: edge.end_offset,
                path_offset: edge.path_offset,
                time_start: edge.time_start - request.departure_time - edge.total_departure_shift,
                envelope: edge.envelope.clone(),
            })
            .collect();
        let stops: Vec<TrainStop> = edges
            .iter()
            .filter_map(|edge| {
                edge.stop_duration
                    .map(|duration| TrainStop::new(edge.path_offset + edge.length(), duration))
            })
            .collect();

        let path = StdcmPath {
            blocks: graph.path_blocks(id),
            ranges,
            stops,
            origin_offset: first.start_offset,
            length: last.path_offset + last.length(),
        };
        debug!(
            blocks = path.blocks.len(),
            length = path.length,
            departure_shift,
            "Path found"
        );

        let intermediate: Vec<f64> = path
            .stops
            .iter()
            .map(|s| s.position)
            .filter(|&p| p < path.length - OFFSET_EPSILON)
            .collect();
        let context = SimContext::new(path.length, 0.0)
            .with_stops(&intermediate)
            .stopping_at_end(true);
        let max_speed = self.simulator.simulate(&request.rolling_stock, &context)?;

        let envelope = build_final_envelope(
            &path,
            &max_speed,
            request.standard_allowance,
            self.availability,
            departure_time,
            self.config,
        )?;

        Ok(StdcmResult {
            path,
            departure_time,
            departure_shift,
            max_speed_envelope: max_speed,
            envelope,
            explored_edges: graph.len(),
        })
    }
}

/// Spread the standard allowance evenly over an edge.
fn pad(envelope: Envelope, allowance: Option<AllowanceValue>) -> Result<Envelope, StdcmError> {
    let Some(allowance) = allowance else {
        return Ok(envelope);
    };
    let length = envelope.end_pos();
    let added = allowance.added_time(envelope.total_time(), length);
    if added <= 0.0 {
        return Ok(envelope);
    }
    let range = AllowanceRange::new(0.0, length, added);
    Ok(apply_allowance(
        &envelope,
        &[range],
        AllowanceDistribution::Linear,
    )?)
}
