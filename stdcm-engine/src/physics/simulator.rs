//! Fastest-trajectory simulation.

use super::{Envelope, PhysicsError, RollingStock};

/// What a simulation has to respect.
#[derive(Debug, Clone, Copy)]
pub struct SimContext<'a> {
    /// Length of the simulated path (m).
    pub length: f64,

    /// Head speed at position zero (m/s).
    pub initial_speed: f64,

    /// Positions where the train must come to a standstill, sorted.
    pub stops: &'a [f64],

    /// Whether the train must stop at the end of the path.
    pub stop_at_end: bool,
}

impl<'a> SimContext<'a> {
    /// A context running over `length` metres from `initial_speed`.
    pub fn new(length: f64, initial_speed: f64) -> Self {
        Self {
            length,
            initial_speed,
            stops: &[],
            stop_at_end: false,
        }
    }

    /// Require standstills at `stops`.
    pub fn with_stops(mut self, stops: &'a [f64]) -> Self {
        self.stops = stops;
        self
    }

    /// Require a standstill at the end of the path.
    pub fn stopping_at_end(mut self, stop: bool) -> Self {
        self.stop_at_end = stop;
        self
    }
}

/// Produces the time-position relation of a train over a path.
///
/// This abstraction allows the search to be driven by a simplified model
/// in tests and by a richer physics integration elsewhere.
pub trait Simulator {
    /// Simulate the fastest trajectory allowed by `context`.
    fn simulate(
        &self,
        rolling_stock: &RollingStock,
        context: &SimContext<'_>,
    ) -> Result<Envelope, PhysicsError>;
}

/// Flat-track simulator with constant acceleration and braking.
///
/// The speed at each position is the lowest of the rolling stock's maximum
/// speed, the acceleration curve from the last standstill (or from the
/// initial speed), and the braking curve to the next standstill.
#[derive(Debug, Clone)]
pub struct MaxSpeedSimulator {
    position_step: f64,
}

impl MaxSpeedSimulator {
    /// Create a simulator sampling every `position_step` metres.
    pub fn new(position_step: f64) -> Self {
        Self { position_step }
    }
}

impl Default for MaxSpeedSimulator {
    fn default() -> Self {
        Self::new(10.0)
    }
}

/// Speed profile bounded by acceleration from anchors and braking to stops.
struct Profile<'a> {
    rolling_stock: &'a RollingStock,
    initial_speed: f64,
    stops: &'a [f64],
}

impl Profile<'_> {
    fn speed(&self, position: f64) -> f64 {
        let rs = self.rolling_stock;
        let last_stop = self.stops.iter().rev().find(|&&s| s <= position);
        let next_stop = self.stops.iter().find(|&&s| s >= position);

        let accel = match last_stop {
            Some(&s) => (2.0 * rs.acceleration * (position - s)).sqrt(),
            None => (self.initial_speed.powi(2) + 2.0 * rs.acceleration * position).sqrt(),
        };
        let brake = match next_stop {
            Some(&s) => (2.0 * rs.deceleration * (s - position)).sqrt(),
            None => f64::INFINITY,
        };
        rs.max_speed.min(accel).min(brake)
    }

    /// Positions where the profile changes regime.
    fn phase_boundaries(&self, length: f64) -> Vec<f64> {
        let rs = self.rolling_stock;
        let vmax_sq = rs.max_speed.powi(2);
        let mut out = Vec::new();

        out.push((vmax_sq - self.initial_speed.powi(2)) / (2.0 * rs.acceleration));
        for &stop in self.stops {
            out.push(stop - vmax_sq / (2.0 * rs.deceleration));
            out.push(stop + vmax_sq / (2.0 * rs.acceleration));
        }

        // Where an acceleration curve meets the next braking curve.
        let a = rs.acceleration;
        let d = rs.deceleration;
        if let Some(&first) = self.stops.first() {
            out.push((2.0 * d * first - self.initial_speed.powi(2)) / (2.0 * (a + d)));
        }
        for pair in self.stops.windows(2) {
            out.push((a * pair[0] + d * pair[1]) / (a + d));
        }

        out.retain(|&x| x > 0.0 && x < length);
        out
    }
}

impl Simulator for MaxSpeedSimulator {
    fn simulate(
        &self,
        rolling_stock: &RollingStock,
        context: &SimContext<'_>,
    ) -> Result<Envelope, PhysicsError> {
        rolling_stock.validate()?;
        if !context.length.is_finite() || context.length <= 0.0 {
            return Err(PhysicsError::InvalidContext("length must be positive"));
        }
        if !context.initial_speed.is_finite() || context.initial_speed < 0.0 {
            return Err(PhysicsError::InvalidContext(
                "initial speed must be non-negative",
            ));
        }
        if !self.position_step.is_finite() || self.position_step <= 0.0 {
            return Err(PhysicsError::InvalidContext(
                "position step must be positive",
            ));
        }

        let length = context.length;
        let mut stops: Vec<f64> = context
            .stops
            .iter()
            .copied()
            .filter(|&s| (0.0..=length).contains(&s))
            .collect();
        if context.stop_at_end {
            stops.push(length);
        }
        stops.sort_by(f64::total_cmp);
        stops.dedup();

        let profile = Profile {
            rolling_stock,
            initial_speed: context.initial_speed.min(rolling_stock.max_speed),
            stops: &stops,
        };

        let mut positions: Vec<f64> = Vec::new();
        let mut x = 0.0;
        while x < length {
            positions.push(x);
            x += self.position_step;
        }
        positions.push(length);
        positions.extend(stops.iter().copied());
        positions.extend(profile.phase_boundaries(length));
        positions.sort_by(f64::total_cmp);
        positions.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

        let mut speeds: Vec<f64> = positions.iter().map(|&p| profile.speed(p)).collect();

        // Two consecutive standstills would need infinite time; the profile
        // is strictly positive between them, so sample the midpoint.
        let mut i = 0;
        while i + 1 < positions.len() {
            if speeds[i] <= 0.0 && speeds[i + 1] <= 0.0 {
                let mid = 0.5 * (positions[i] + positions[i + 1]);
                positions.insert(i + 1, mid);
                speeds.insert(i + 1, profile.speed(mid));
            }
            i += 1;
        }

        Envelope::from_speeds(&positions, &speeds)
    }
}
