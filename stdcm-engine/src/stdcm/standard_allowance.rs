//! Final envelope: spread the allowance without creating conflicts.
//!
//! The path found by the search is re-simulated as a whole at maximum speed.
//! Spreading the standard allowance over that simulation can move the train
//! into a reservation the exploration had avoided. Each such conflict pins
//! the train at the time the exploration passed the conflicting offset, and
//! the allowance is spread again between the pinned points until nothing
//! conflicts.
//!
//! MARECO is tried first. If it cannot absorb the requested time, keeps
//! hitting the same conflict, or runs out of iterations, the whole process
//! restarts with the linear distribution.

use std::collections::btree_map::{BTreeMap, Entry};

use serde::Serialize;
use tracing::{debug, debug_span, info};

use crate::conflicts::{Availability, BlockAvailability};
use crate::physics::{
    AllowanceDistribution, AllowanceError, AllowanceRange, AllowanceValue, Envelope,
    EnvelopeWithStops, TimeInterpolate, apply_allowance,
};

use super::config::StdcmConfig;
use super::error::StdcmError;
use super::path::StdcmPath;

/// Ranges shorter than this are not given any allowance (m).
const POSITION_EPSILON: f64 = 1e-6;

/// A travelled offset pinned to a time since departure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FixedTimePoint {
    /// Travelled offset (m).
    pub offset: f64,

    /// Time since departure the head must be at `offset`, arrival time for a
    /// stop (s).
    pub time: f64,

    /// Dwell time if the point is a stop (s).
    pub stop_duration: Option<f64>,
}

impl FixedTimePoint {
    /// A stop reached at `time`.
    pub fn stop(offset: f64, time: f64, duration: f64) -> Self {
        Self {
            offset,
            time,
            stop_duration: Some(duration),
        }
    }

    /// A point passed at `time`.
    pub fn passage(offset: f64, time: f64) -> Self {
        Self {
            offset,
            time,
            stop_duration: None,
        }
    }

    /// Time the head leaves the point (s).
    pub fn departure_time(&self) -> f64 {
        self.time + self.stop_duration.unwrap_or(0.0)
    }
}

/// Fixed points ordered by offset, at most one per millimetre.
#[derive(Debug, Clone, Default)]
pub struct FixedPoints {
    points: BTreeMap<i64, FixedTimePoint>,
}

impl FixedPoints {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(offset: f64) -> i64 {
        (offset * 1000.0).round() as i64
    }

    /// Add a point. Returns false, leaving the set unchanged, if a point
    /// already exists at that offset.
    pub fn insert(&mut self, point: FixedTimePoint) -> bool {
        match self.points.entry(Self::key(point.offset)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(point);
                true
            }
        }
    }

    /// Returns true if a point exists at `offset`.
    pub fn contains(&self, offset: f64) -> bool {
        self.points.contains_key(&Self::key(offset))
    }

    /// Points by increasing offset.
    pub fn iter(&self) -> impl Iterator<Item = &FixedTimePoint> {
        self.points.values()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if there are no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Conflict-free trajectory of the whole path.
#[derive(Debug, Clone, Serialize)]
pub struct FinalEnvelope {
    /// Running trajectory from the origin, dwell times excluded.
    pub envelope: Envelope,

    /// Points the trajectory was pinned to.
    pub fixed_points: Vec<FixedTimePoint>,

    /// Availability checks run with the retained distribution.
    pub iterations: usize,

    /// Distribution that produced `envelope`.
    pub distribution: AllowanceDistribution,
}

/// Why a refinement round gave up.
#[derive(Debug)]
enum Stuck {
    /// A conflict was found again at a pinned offset.
    Repeated { offset: f64 },
    /// The iteration cap was reached.
    Exhausted { iterations: usize },
    Failed(StdcmError),
}

/// Build the conflict-free trajectory of `path`.
///
/// `max_speed` is the fastest trajectory over the whole path, braking to a
/// standstill at every stop. `departure_time` is the absolute departure,
/// departure shift included.
pub fn build_final_envelope(
    path: &StdcmPath,
    max_speed: &Envelope,
    standard_allowance: Option<AllowanceValue>,
    availability: &impl BlockAvailability,
    departure_time: f64,
    config: &StdcmConfig,
) -> Result<FinalEnvelope, StdcmError> {
    let _span = debug_span!(
        "final_envelope",
        ranges = path.ranges.len(),
        stops = path.stops.len()
    )
    .entered();

    let refinement = Refinement {
        path,
        max_speed,
        standard_allowance,
        availability,
        departure_time,
    };

    let mareco = AllowanceDistribution::Mareco {
        capacity_speed_limit: config.capacity_speed_limit,
    };
    match refinement.run(mareco) {
        Ok(envelope) => return Ok(envelope),
        Err(Stuck::Failed(err)) if !is_too_much_time(&err) => return Err(err),
        Err(stuck) => info!(?stuck, "Falling back to linear allowance"),
    }

    refinement
        .run(AllowanceDistribution::Linear)
        .map_err(|stuck| match stuck {
            Stuck::Repeated { offset } => StdcmError::RepeatedFixedPoint { offset },
            Stuck::Exhausted { iterations } => StdcmError::NoConflictFreeSchedule { iterations },
            Stuck::Failed(err) => err,
        })
}

fn is_too_much_time(err: &StdcmError) -> bool {
    matches!(err, StdcmError::Allowance(AllowanceError::TooMuchTime { .. }))
}

struct Refinement<'a, A> {
    path: &'a StdcmPath,
    max_speed: &'a Envelope,
    standard_allowance: Option<AllowanceValue>,
    availability: &'a A,
    departure_time: f64,
}

impl<A: BlockAvailability> Refinement<'_, A> {
    fn run(&self, distribution: AllowanceDistribution) -> Result<FinalEnvelope, Stuck> {
        let mut fixed = self.stop_points();
        let max_iterations = 2 * self.path.ranges.len().max(1);

        for iteration in 1..=max_iterations {
            let ranges = allowance_ranges(self.max_speed, &fixed);
            let envelope = apply_allowance(self.max_speed, &ranges, distribution)
                .map_err(|err| Stuck::Failed(err.into()))?;

            let with_stops = EnvelopeWithStops::new(&envelope, &self.path.stops);
            let availability = self.availability.get_availability(
                &self.path.blocks,
                self.path.origin_offset,
                self.path.origin_offset + self.path.length,
                &with_stops,
                self.departure_time,
            );
            match availability {
                Availability::Available { .. } => {
                    debug!(iteration, fixed_points = fixed.len(), "Final envelope is conflict free");
                    return Ok(FinalEnvelope {
                        envelope,
                        fixed_points: fixed.iter().copied().collect(),
                        iterations: iteration,
                        distribution,
                    });
                }
                Availability::NotEnoughLookahead => {
                    return Err(Stuck::Failed(StdcmError::InsufficientData(
                        "availability of the complete path depends on blocks past the destination"
                            .to_string(),
                    )));
                }
                Availability::Unavailable {
                    first_conflict_offset,
                    ..
                } => {
                    let offset = self.path.travelled_offset(first_conflict_offset);
                    let point = FixedTimePoint::passage(offset, self.path.time_at(offset));
                    debug!(iteration, offset, time = point.time, "Pinning conflict");
                    if !fixed.insert(point) {
                        return Err(Stuck::Repeated { offset });
                    }
                }
            }
        }
        Err(Stuck::Exhausted {
            iterations: max_iterations,
        })
    }

    /// One point per stop, at the time the allowance-padded fastest
    /// trajectory reaches it.
    fn stop_points(&self) -> FixedPoints {
        let mut points = FixedPoints::new();
        let mut previous_dwell = 0.0;
        for stop in &self.path.stops {
            let base = self.max_speed.interpolate_total_time_clamp(stop.position);
            let padded = base
                + self
                    .standard_allowance
                    .map_or(0.0, |allowance| allowance.added_time(base, stop.position));
            points.insert(FixedTimePoint::stop(
                stop.position,
                padded + previous_dwell,
                stop.duration,
            ));
            previous_dwell += stop.duration;
        }
        points
    }
}

/// Split `max_speed` at the fixed points, asking each range for the time
/// that brings the train to its end point on schedule.
fn allowance_ranges(max_speed: &Envelope, points: &FixedPoints) -> Vec<AllowanceRange> {
    let end = max_speed.end_pos();
    let mut ranges = Vec::with_capacity(points.len() + 1);
    let mut transition = 0.0;
    let mut transition_time = 0.0;

    for point in points.iter() {
        if point.offset > transition + POSITION_EPSILON {
            let base = max_speed.interpolate_total_time_clamp(point.offset)
                - max_speed.interpolate_total_time_clamp(transition);
            let needed = point.time - (transition_time + base);
            ranges.push(AllowanceRange::new(transition, point.offset, needed));
            transition = point.offset;
        }
        transition_time = point.departure_time();
    }
    if end > transition + POSITION_EPSILON {
        ranges.push(AllowanceRange::new(transition, end, 0.0));
    }
    if let Some(last) = ranges.last_mut() {
        last.end = end;
    }
    ranges
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn fixed_points_stay_ordered(offsets in prop::collection::vec(0.0f64..10_000.0, 0..40)) {
            let mut points = FixedPoints::new();
            for (i, &offset) in offsets.iter().enumerate() {
                let had = points.contains(offset);
                let before = points.len();
                let inserted = points.insert(FixedTimePoint::passage(offset, i as f64));
                prop_assert_eq!(inserted, !had);
                prop_assert_eq!(points.len(), before + usize::from(inserted));
            }
            let ordered: Vec<f64> = points.iter().map(|p| p.offset).collect();
            prop_assert!(ordered.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
