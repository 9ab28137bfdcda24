//! Occupancy ledger and the oracle that reads it.

use std::collections::HashMap;

use tracing::trace;

use crate::infra::{BlockId, BlockInfra};
use crate::physics::TimeInterpolate;

use super::{
    Availability, BlockAvailability, IncrementalEnvelopeAdapter, IncrementalRequirementCallbacks,
};

/// Overlaps shorter than this are rounding noise (s).
const TIME_EPSILON: f64 = 1e-6;

/// Errors raised while recording reservations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    /// Window is empty, reversed or not a number
    #[error("invalid reservation window [{start}, {end}] on {block}")]
    InvalidWindow { block: BlockId, start: f64, end: f64 },
}

/// A time window during which another train holds a block.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    /// Reserved block.
    pub block: BlockId,

    /// Start of the window (s).
    pub start: f64,

    /// End of the window (s).
    pub end: f64,

    /// Train holding the reservation, for diagnostics.
    pub owner: Option<String>,
}

impl Reservation {
    /// Create an anonymous reservation.
    pub fn new(block: BlockId, start: f64, end: f64) -> Self {
        Self {
            block,
            start,
            end,
            owner: None,
        }
    }

    /// Attach the owning train.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Reserved time windows per block.
///
/// The ledger is built up front and only read during searches, so it can be
/// shared by reference between concurrent searches.
#[derive(Debug, Clone, Default)]
pub struct OccupancyLedger {
    by_block: HashMap<BlockId, Vec<Reservation>>,
}

impl OccupancyLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reservation, keeping each block's windows sorted by start.
    pub fn reserve(&mut self, reservation: Reservation) -> Result<(), LedgerError> {
        let valid = !reservation.start.is_nan()
            && !reservation.end.is_nan()
            && reservation.start < reservation.end;
        if !valid {
            return Err(LedgerError::InvalidWindow {
                block: reservation.block,
                start: reservation.start,
                end: reservation.end,
            });
        }

        let windows = self.by_block.entry(reservation.block).or_default();
        let idx = windows.partition_point(|r| r.start <= reservation.start);
        windows.insert(idx, reservation);
        Ok(())
    }

    /// Reservations on `block`, sorted by start.
    pub fn reservations(&self, block: BlockId) -> &[Reservation] {
        self.by_block
            .get(&block)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of reservations.
    pub fn len(&self) -> usize {
        self.by_block.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is reserved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Time window during which the train being scheduled needs a block.
#[derive(Debug, Clone)]
struct Occupancy {
    block: BlockId,
    begin: f64,
    end: f64,
    /// Head offset where the block starts being needed.
    begin_offset: f64,
    /// Head offset where the tail clears the block.
    release_offset: f64,
}

impl Occupancy {
    fn overlaps(&self, reservation: &Reservation, delay: f64) -> bool {
        reservation.start < self.end + delay - TIME_EPSILON
            && self.begin + delay < reservation.end - TIME_EPSILON
    }

    /// Boundary violated by `reservation`: entering during the window, or
    /// holding the block past its start.
    fn conflict_offset(&self, reservation: &Reservation) -> f64 {
        if self.begin >= reservation.start {
            self.begin_offset
        } else {
            self.release_offset
        }
    }
}

/// Oracle over an [`OccupancyLedger`].
///
/// A block is needed from the moment the head is `sight_distance` metres
/// before its start, until the tail has left its end.
#[derive(Debug, Clone)]
pub struct LedgerAvailability<'a, I: BlockInfra> {
    infra: &'a I,
    ledger: &'a OccupancyLedger,
    train_length: f64,
    sight_distance: f64,
}

impl<'a, I: BlockInfra> LedgerAvailability<'a, I> {
    /// Create an oracle for a train of `train_length` metres.
    pub fn new(
        infra: &'a I,
        ledger: &'a OccupancyLedger,
        train_length: f64,
        sight_distance: f64,
    ) -> Self {
        Self {
            infra,
            ledger,
            train_length,
            sight_distance,
        }
    }

    fn occupancies(
        &self,
        blocks: &[BlockId],
        start_offset: f64,
        end_offset: f64,
        adapter: &impl IncrementalRequirementCallbacks,
        start_time: f64,
    ) -> Vec<Occupancy> {
        let mut out = Vec::new();
        let mut block_start = 0.0;
        for &block in blocks {
            let block_end = block_start + self.infra.block_length(block);
            let needed_from = block_start - self.sight_distance;
            let begin_local = needed_from - start_offset;
            let end_local = block_end - start_offset;
            block_start = block_end;

            // Released before this section starts.
            if end_local + self.train_length < 0.0 {
                continue;
            }
            let arrival = adapter.arrival_time_in_range(begin_local, end_local);
            if !arrival.is_finite() {
                continue;
            }
            let release = adapter.departure_time_from_range(begin_local, end_local);
            let release = if release.is_finite() {
                release
            } else {
                adapter.current_time()
            };

            out.push(Occupancy {
                block,
                begin: start_time + arrival,
                end: start_time + release,
                begin_offset: needed_from.max(start_offset),
                release_offset: (block_end + self.train_length).min(end_offset),
            });
        }
        out
    }

    /// Smallest delay after which no occupancy overlaps a reservation.
    fn minimum_delay(&self, occupancies: &[Occupancy]) -> f64 {
        let pairs: usize = occupancies
            .iter()
            .map(|o| self.ledger.reservations(o.block).len())
            .sum();

        let mut delay: f64 = 0.0;
        for _ in 0..=pairs {
            let mut needed = delay;
            for occupancy in occupancies {
                for reservation in self.ledger.reservations(occupancy.block) {
                    if occupancy.overlaps(reservation, delay) {
                        needed = needed.max(reservation.end - occupancy.begin);
                    }
                }
            }
            if needed <= delay {
                break;
            }
            delay = needed;
        }
        delay
    }
}

impl<I: BlockInfra> BlockAvailability for LedgerAvailability<'_, I> {
    fn get_availability(
        &self,
        blocks: &[BlockId],
        start_offset: f64,
        end_offset: f64,
        envelope: &dyn TimeInterpolate,
        start_time: f64,
    ) -> Availability {
        let complete = envelope.end_speed() <= 0.0;
        let adapter = IncrementalEnvelopeAdapter::new(self.train_length, Some(envelope), complete);

        let total_length: f64 = blocks.iter().map(|&b| self.infra.block_length(b)).sum();
        if !adapter.is_simulation_complete() && end_offset + self.sight_distance > total_length {
            let has_next = blocks
                .last()
                .is_some_and(|&last| !self.infra.successors(last).is_empty());
            if has_next {
                return Availability::NotEnoughLookahead;
            }
        }

        let occupancies = self.occupancies(blocks, start_offset, end_offset, &adapter, start_time);

        let first_conflict = occupancies
            .iter()
            .flat_map(|o| {
                self.ledger
                    .reservations(o.block)
                    .iter()
                    .filter(|r| o.overlaps(r, 0.0))
                    .map(|r| o.conflict_offset(r))
            })
            .min_by(f64::total_cmp);

        if let Some(first_conflict_offset) = first_conflict {
            let duration = self.minimum_delay(&occupancies);
            trace!(
                start_offset,
                end_offset,
                first_conflict_offset,
                duration,
                "Section unavailable"
            );
            return Availability::Unavailable {
                duration,
                first_conflict_offset,
            };
        }

        let mut maximum_delay = f64::INFINITY;
        let mut time_of_next_conflict = f64::INFINITY;
        for occupancy in &occupancies {
            for reservation in self.ledger.reservations(occupancy.block) {
                if reservation.start >= occupancy.end - TIME_EPSILON {
                    maximum_delay = maximum_delay.min(reservation.start - occupancy.end);
                    time_of_next_conflict = time_of_next_conflict.min(reservation.start);
                }
            }
        }
        Availability::Available {
            maximum_delay: maximum_delay.max(0.0),
            time_of_next_conflict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{BlockGraph, DetectorId};
    use crate::physics::{Envelope, EnvelopeWithStops, TrainStop};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    /// Blocks of 1000 m chained detector to detector.
    pub(super) fn line(n: u32) -> (BlockGraph, Vec<BlockId>) {
        let mut graph = BlockGraph::new();
        let blocks = (0..n)
            .map(|i| {
                graph
                    .add_block(DetectorId(i), DetectorId(i + 1), 1000.0)
                    .unwrap()
            })
            .collect();
        (graph, blocks)
    }

    pub(super) fn ledger(reservations: &[(BlockId, f64, f64)]) -> OccupancyLedger {
        let mut ledger = OccupancyLedger::new();
        for &(block, start, end) in reservations {
            ledger.reserve(Reservation::new(block, start, end)).unwrap();
        }
        ledger
    }

    #[test]
    fn reservations_stay_sorted() {
        let block = BlockId(0);
        let ledger = ledger(&[(block, 50.0, 60.0), (block, 10.0, 20.0), (block, 30.0, 40.0)]);

        let starts: Vec<f64> = ledger.reservations(block).iter().map(|r| r.start).collect();
        assert_eq!(starts, [10.0, 30.0, 50.0]);
        assert_eq!(ledger.len(), 3);
        assert!(ledger.reservations(BlockId(9)).is_empty());
    }

    #[test]
    fn rejects_empty_window() {
        let mut ledger = OccupancyLedger::new();
        let err = ledger
            .reserve(Reservation::new(BlockId(2), 30.0, 30.0))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid reservation window [30, 30] on block#2"
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn entering_inside_window_conflicts_at_block_entry() {
        let (graph, blocks) = line(1);
        let ledger = ledger(&[(blocks[0], 50.0, 300.0)]);
        let oracle = LedgerAvailability::new(&graph, &ledger, 100.0, 0.0);
        let envelope = Envelope::constant_speed(1000.0, 10.0).unwrap();

        let result = oracle.get_availability(&blocks, 0.0, 1000.0, &envelope, 100.0);

        let Availability::Unavailable {
            duration,
            first_conflict_offset,
        } = result
        else {
            panic!("expected a conflict, got {result:?}");
        };
        assert_eq!(first_conflict_offset, 0.0);
        assert!(close(duration, 200.0));
    }

    #[test]
    fn passing_before_window_is_available() {
        let (graph, blocks) = line(1);
        let ledger = ledger(&[(blocks[0], 400.0, 500.0)]);
        let oracle = LedgerAvailability::new(&graph, &ledger, 100.0, 0.0);
        let envelope = Envelope::constant_speed(1000.0, 10.0).unwrap();

        // occupied from 100 until at least the end of the envelope at 200
        let result = oracle.get_availability(&blocks, 0.0, 1000.0, &envelope, 100.0);

        assert_eq!(
            result,
            Availability::Available {
                maximum_delay: 200.0,
                time_of_next_conflict: 400.0,
            }
        );
    }

    #[test]
    fn releasing_late_conflicts_at_release_point() {
        let (graph, blocks) = line(2);
        let ledger = ledger(&[(blocks[0], 50.0, 500.0)]);
        let oracle = LedgerAvailability::new(&graph, &ledger, 100.0, 0.0);
        let envelope = Envelope::constant_speed(2000.0, 10.0).unwrap();

        // first block held from 0 until the tail clears it at 110
        let result = oracle.get_availability(&blocks, 0.0, 2000.0, &envelope, 0.0);

        let Availability::Unavailable {
            duration,
            first_conflict_offset,
        } = result
        else {
            panic!("expected a conflict, got {result:?}");
        };
        assert_eq!(first_conflict_offset, 1100.0);
        assert!(close(duration, 500.0));
    }

    #[test]
    fn forced_delay_then_available() {
        // second block planned entry at 100 s, window overlaps it by 10 s
        let (graph, blocks) = line(2);
        let ledger = ledger(&[(blocks[1], 80.0, 110.0)]);
        let oracle = LedgerAvailability::new(&graph, &ledger, 100.0, 0.0);
        let envelope = Envelope::constant_speed(2000.0, 10.0).unwrap();

        let first = oracle.get_availability(&blocks, 0.0, 2000.0, &envelope, 0.0);
        assert!(matches!(
            first,
            Availability::Unavailable { duration, first_conflict_offset }
                if close(duration, 10.0) && first_conflict_offset == 1000.0
        ));

        let shifted = oracle.get_availability(&blocks, 0.0, 2000.0, &envelope, 10.0);
        assert!(shifted.is_available());
    }

    #[test]
    fn minimum_delay_clears_every_window() {
        let (graph, blocks) = line(2);
        let ledger = ledger(&[(blocks[1], 80.0, 110.0), (blocks[1], 150.0, 400.0)]);
        let oracle = LedgerAvailability::new(&graph, &ledger, 100.0, 0.0);
        let envelope = Envelope::constant_speed(2000.0, 10.0).unwrap();

        let result = oracle.get_availability(&blocks, 0.0, 2000.0, &envelope, 0.0);
        assert!(matches!(
            result,
            Availability::Unavailable { duration, .. } if close(duration, 300.0)
        ));
        assert!(
            oracle
                .get_availability(&blocks, 0.0, 2000.0, &envelope, 300.0)
                .is_available()
        );
    }

    #[test]
    fn sight_distance_brings_entry_forward() {
        let (graph, blocks) = line(2);
        // free when the head enters at 100 s, but not 40 m earlier
        let ledger = ledger(&[(blocks[1], 0.0, 98.0)]);
        let envelope = Envelope::constant_speed(2000.0, 10.0).unwrap();

        let blind = LedgerAvailability::new(&graph, &ledger, 100.0, 0.0);
        assert!(
            blind
                .get_availability(&blocks, 0.0, 2000.0, &envelope, 0.0)
                .is_available()
        );

        let sighted = LedgerAvailability::new(&graph, &ledger, 100.0, 40.0);
        let result = sighted.get_availability(&blocks, 0.0, 2000.0, &envelope, 0.0);
        assert!(matches!(
            result,
            Availability::Unavailable { duration, first_conflict_offset }
                if close(duration, 2.0) && first_conflict_offset == 960.0
        ));
    }

    #[test]
    fn partial_section_only_sees_its_blocks() {
        let (graph, blocks) = line(3);
        let ledger = ledger(&[(blocks[0], 0.0, 5.0)]);
        let oracle = LedgerAvailability::new(&graph, &ledger, 100.0, 0.0);
        let envelope = Envelope::constant_speed(1000.0, 10.0).unwrap();

        // third block, far from the reservation on the first one
        let result = oracle.get_availability(&blocks, 2000.0, 3000.0, &envelope, 200.0);
        assert!(result.is_available());
    }

    #[test]
    fn lookahead_needed_while_moving() {
        let (graph, blocks) = line(3);
        let ledger = OccupancyLedger::new();
        let oracle = LedgerAvailability::new(&graph, &ledger, 100.0, 400.0);
        let moving = Envelope::constant_speed(1000.0, 10.0).unwrap();

        assert_eq!(
            oracle.get_availability(&blocks[..1], 0.0, 1000.0, &moving, 0.0),
            Availability::NotEnoughLookahead
        );
        assert!(
            oracle
                .get_availability(&blocks[..2], 0.0, 1000.0, &moving, 0.0)
                .is_available()
        );
        // nothing follows the last block
        assert!(
            oracle
                .get_availability(&blocks, 2000.0, 3000.0, &moving, 0.0)
                .is_available()
        );
    }

    #[test]
    fn stopped_train_needs_no_lookahead() {
        let (graph, blocks) = line(2);
        let ledger = OccupancyLedger::new();
        let oracle = LedgerAvailability::new(&graph, &ledger, 100.0, 400.0);
        let stopping = Envelope::from_speeds(&[0.0, 500.0, 1000.0], &[10.0, 10.0, 0.0]).unwrap();
        let stops = [TrainStop::new(1000.0, 0.0)];
        let with_stops = EnvelopeWithStops::new(&stopping, &stops);

        assert!(
            oracle
                .get_availability(&blocks[..1], 0.0, 1000.0, &with_stops, 0.0)
                .is_available()
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::tests::{ledger, line};
    use super::*;
    use crate::physics::Envelope;
    use proptest::prelude::*;

    fn windows_strategy() -> impl Strategy<Value = Vec<(usize, f64, f64)>> {
        prop::collection::vec((0usize..3, 0.0f64..600.0, 1.0f64..120.0), 0..8)
            .prop_map(|v| v.into_iter().map(|(b, s, d)| (b, s, s + d)).collect())
    }

    proptest! {
        #[test]
        fn reported_delay_is_minimal(
            windows in windows_strategy(),
            speed in 5.0f64..50.0,
        ) {
            let (graph, blocks) = line(3);
            let reservations: Vec<_> = windows
                .iter()
                .map(|&(b, s, e)| (blocks[b], s, e))
                .collect();
            let ledger = ledger(&reservations);
            let oracle = LedgerAvailability::new(&graph, &ledger, 100.0, 200.0);
            let envelope = Envelope::constant_speed(3000.0, speed).unwrap();

            let result = oracle.get_availability(&blocks, 0.0, 3000.0, &envelope, 0.0);
            if let Availability::Unavailable { duration, .. } = result {
                prop_assert!(duration > 0.0);
                let after = oracle.get_availability(&blocks, 0.0, 3000.0, &envelope, duration);
                prop_assert!(after.is_available(), "still blocked after {duration}: {after:?}");
                if duration > 1e-3 {
                    let before = oracle.get_availability(
                        &blocks, 0.0, 3000.0, &envelope, duration - 1e-3,
                    );
                    prop_assert!(!before.is_available());
                }
            }
        }

        #[test]
        fn maximum_delay_stays_clear(
            windows in windows_strategy(),
            speed in 5.0f64..50.0,
        ) {
            let (graph, blocks) = line(3);
            let reservations: Vec<_> = windows
                .iter()
                .map(|&(b, s, e)| (blocks[b], s, e))
                .collect();
            let ledger = ledger(&reservations);
            let oracle = LedgerAvailability::new(&graph, &ledger, 100.0, 200.0);
            let envelope = Envelope::constant_speed(3000.0, speed).unwrap();

            let start = 700.0;
            let result = oracle.get_availability(&blocks, 0.0, 3000.0, &envelope, start);
            if let Availability::Available { maximum_delay, .. } = result {
                let probe = if maximum_delay.is_finite() { maximum_delay } else { 1000.0 };
                let shifted = oracle.get_availability(
                    &blocks, 0.0, 3000.0, &envelope, start + probe,
                );
                prop_assert!(shifted.is_available());
            }
        }
    }
}
