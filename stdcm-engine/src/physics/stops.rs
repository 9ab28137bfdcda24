//! Scheduled stops layered over an envelope.

use serde::Serialize;

use super::TimeInterpolate;

/// A scheduled stop on the simulated path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrainStop {
    /// Position of the stop from the path start (m).
    pub position: f64,

    /// Dwell time (s).
    pub duration: f64,
}

impl TrainStop {
    /// Create a new stop.
    pub fn new(position: f64, duration: f64) -> Self {
        Self { position, duration }
    }
}

/// An envelope whose times include the dwell time of its stops.
///
/// The running envelope already brakes to zero at every stop; this wrapper
/// only adds the time spent standing. A position exactly at a stop reports
/// the departure time from that stop.
#[derive(Debug, Clone)]
pub struct EnvelopeWithStops<'a, E: TimeInterpolate> {
    envelope: &'a E,
    stops: &'a [TrainStop],
}

impl<'a, E: TimeInterpolate> EnvelopeWithStops<'a, E> {
    /// Wrap `envelope` with `stops`, which must be sorted by position.
    pub fn new(envelope: &'a E, stops: &'a [TrainStop]) -> Self {
        debug_assert!(
            stops.windows(2).all(|w| w[0].position <= w[1].position),
            "stops must be sorted"
        );
        Self { envelope, stops }
    }

    /// The running envelope without dwell times.
    pub fn envelope(&self) -> &E {
        self.envelope
    }

    /// The stops.
    pub fn stops(&self) -> &[TrainStop] {
        self.stops
    }

    fn stop_time_until(&self, position: f64) -> f64 {
        self.stops
            .iter()
            .take_while(|s| s.position <= position)
            .map(|s| s.duration)
            .sum()
    }
}

impl<E: TimeInterpolate> TimeInterpolate for EnvelopeWithStops<'_, E> {
    fn interpolate_total_time(&self, position: f64) -> f64 {
        self.envelope.interpolate_total_time(position) + self.stop_time_until(position)
    }

    fn interpolate_total_time_clamp(&self, position: f64) -> f64 {
        let position = position.clamp(0.0, self.envelope.end_pos());
        self.envelope.interpolate_total_time_clamp(position) + self.stop_time_until(position)
    }

    fn end_pos(&self) -> f64 {
        self.envelope.end_pos()
    }

    fn total_time(&self) -> f64 {
        self.envelope.total_time() + self.stops.iter().map(|s| s.duration).sum::<f64>()
    }

    fn end_speed(&self) -> f64 {
        self.envelope.end_speed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::Envelope;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn adds_dwell_after_stop() {
        let envelope = Envelope::constant_speed(1000.0, 10.0).unwrap();
        let stops = [TrainStop::new(500.0, 120.0)];
        let with_stops = EnvelopeWithStops::new(&envelope, &stops);

        assert!(close(with_stops.interpolate_total_time(400.0), 40.0));
        assert!(close(with_stops.interpolate_total_time(500.0), 170.0));
        assert!(close(with_stops.interpolate_total_time(600.0), 180.0));
        assert!(close(with_stops.total_time(), 220.0));
        assert!(close(with_stops.end_pos(), 1000.0));
    }

    #[test]
    fn clamp_includes_every_stop_past_end() {
        let envelope = Envelope::constant_speed(1000.0, 10.0).unwrap();
        let stops = [TrainStop::new(200.0, 30.0), TrainStop::new(1000.0, 60.0)];
        let with_stops = EnvelopeWithStops::new(&envelope, &stops);

        assert!(close(with_stops.interpolate_total_time_clamp(5000.0), 190.0));
        assert!(close(with_stops.interpolate_total_time_clamp(-10.0), 0.0));
    }
}
