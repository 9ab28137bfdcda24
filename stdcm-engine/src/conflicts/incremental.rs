//! Arrival and departure times from a possibly partial trajectory.

use crate::physics::TimeInterpolate;

/// Time queries over path intervals, relative to a simulated trajectory.
///
/// Offsets are relative to the trajectory start. Times are running times
/// from the trajectory start; `f64::INFINITY` means "not within what has
/// been simulated so far".
pub trait IncrementalRequirementCallbacks {
    /// Earliest time the train occupies `[begin, end]`.
    fn arrival_time_in_range(&self, begin: f64, end: f64) -> f64;

    /// Time the train's tail clears `end`.
    fn departure_time_from_range(&self, begin: f64, end: f64) -> f64;

    /// Running time at the simulation horizon.
    fn current_time(&self) -> f64;

    /// Offset of the simulation horizon.
    fn current_path_offset(&self) -> f64;
}

/// Adapts an envelope (usually with stops) to
/// [`IncrementalRequirementCallbacks`].
///
/// Cloning copies the envelope handle, so a clone can be
/// [`extended`](Self::extended) speculatively without touching the original.
#[derive(Debug, Clone)]
pub struct IncrementalEnvelopeAdapter<E> {
    train_length: f64,
    envelope: Option<E>,
    simulation_complete: bool,
}

impl<E: TimeInterpolate> IncrementalEnvelopeAdapter<E> {
    /// Create an adapter over an optional envelope.
    pub fn new(train_length: f64, envelope: Option<E>, simulation_complete: bool) -> Self {
        Self {
            train_length,
            envelope,
            simulation_complete,
        }
    }

    /// A copy of this adapter following a longer simulation.
    pub fn extended(&self, envelope: E, simulation_complete: bool) -> Self {
        Self {
            train_length: self.train_length,
            envelope: Some(envelope),
            simulation_complete,
        }
    }

    /// Whether the simulation reaches the end of the path.
    pub fn is_simulation_complete(&self) -> bool {
        self.simulation_complete
    }

    /// The wrapped envelope, if any.
    pub fn envelope(&self) -> Option<&E> {
        self.envelope.as_ref()
    }
}

impl<E: TimeInterpolate> IncrementalRequirementCallbacks for IncrementalEnvelopeAdapter<E> {
    fn arrival_time_in_range(&self, begin: f64, end: f64) -> f64 {
        let Some(envelope) = &self.envelope else {
            return f64::INFINITY;
        };
        if begin >= 0.0 && begin <= envelope.end_pos() {
            return envelope.interpolate_total_time(begin);
        }
        // The train body already sits over the range at the start.
        if (-self.train_length).max(begin) < end.min(0.0) {
            return 0.0;
        }
        f64::INFINITY
    }

    fn departure_time_from_range(&self, _begin: f64, end: f64) -> f64 {
        let Some(envelope) = &self.envelope else {
            return f64::INFINITY;
        };
        let critical = end + self.train_length;
        if critical >= 0.0 && critical <= envelope.end_pos() {
            return envelope.interpolate_total_time(critical);
        }
        f64::INFINITY
    }

    fn current_time(&self) -> f64 {
        self.envelope.as_ref().map_or(0.0, |e| e.total_time())
    }

    fn current_path_offset(&self) -> f64 {
        self.envelope.as_ref().map_or(0.0, |e| e.end_pos())
    }
}
