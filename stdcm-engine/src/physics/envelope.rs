//! Speed and time envelopes.

use serde::Serialize;

use super::PhysicsError;

/// Time-position relation of a simulated trajectory.
///
/// Positions are measured from the start of the simulated path, times from
/// the moment the train's head is at position zero.
pub trait TimeInterpolate {
    /// Running time when the head reaches `position`.
    ///
    /// `position` must lie within `[0, end_pos]`.
    fn interpolate_total_time(&self, position: f64) -> f64;

    /// Like [`interpolate_total_time`](Self::interpolate_total_time), with
    /// `position` clamped into the envelope first.
    fn interpolate_total_time_clamp(&self, position: f64) -> f64 {
        self.interpolate_total_time(position.clamp(0.0, self.end_pos()))
    }

    /// Last simulated position.
    fn end_pos(&self) -> f64;

    /// Running time at the last simulated position.
    fn total_time(&self) -> f64;

    /// Speed at the last simulated position.
    fn end_speed(&self) -> f64;
}

impl<T: TimeInterpolate + ?Sized> TimeInterpolate for &T {
    fn interpolate_total_time(&self, position: f64) -> f64 {
        (**self).interpolate_total_time(position)
    }

    fn interpolate_total_time_clamp(&self, position: f64) -> f64 {
        (**self).interpolate_total_time_clamp(position)
    }

    fn end_pos(&self) -> f64 {
        (**self).end_pos()
    }

    fn total_time(&self) -> f64 {
        (**self).total_time()
    }

    fn end_speed(&self) -> f64 {
        (**self).end_speed()
    }
}

/// A point of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnvelopePoint {
    /// Position from the envelope start (m).
    pub position: f64,

    /// Speed at this position (m/s).
    pub speed: f64,

    /// Time since the envelope start (s).
    pub time: f64,
}

/// Piecewise constant-acceleration trajectory.
///
/// Between two consecutive points the acceleration is constant, so the
/// squared speed is linear in position and a segment of length `dx` takes
/// `2 dx / (v1 + v2)` seconds. Two consecutive points may share a position
/// to represent a speed discontinuity; such a segment takes no time.
///
/// # Examples
///
/// ```
/// use stdcm_engine::physics::{Envelope, TimeInterpolate};
///
/// let envelope = Envelope::from_speeds(&[0.0, 50.0, 200.0], &[0.0, 10.0, 20.0]).unwrap();
/// assert!((envelope.total_time() - 20.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Envelope {
    points: Vec<EnvelopePoint>,
}

impl Envelope {
    /// Build an envelope from explicit points.
    ///
    /// Points must start at position zero and time zero, with non-decreasing
    /// positions and times and non-negative speeds.
    pub fn new(points: Vec<EnvelopePoint>) -> Result<Self, PhysicsError> {
        if points.len() < 2 {
            return Err(PhysicsError::InvalidEnvelope(
                "at least two points are required",
            ));
        }
        if points[0].position != 0.0 || points[0].time != 0.0 {
            return Err(PhysicsError::InvalidEnvelope(
                "envelope must start at position and time zero",
            ));
        }
        for point in &points {
            if !point.position.is_finite() || !point.time.is_finite() {
                return Err(PhysicsError::InvalidEnvelope("points must be finite"));
            }
            if !point.speed.is_finite() || point.speed < 0.0 {
                return Err(PhysicsError::InvalidEnvelope(
                    "speeds must be finite and non-negative",
                ));
            }
        }
        for pair in points.windows(2) {
            if pair[1].position < pair[0].position {
                return Err(PhysicsError::InvalidEnvelope(
                    "positions must not decrease",
                ));
            }
            if pair[1].time < pair[0].time {
                return Err(PhysicsError::InvalidEnvelope("times must not decrease"));
            }
            if pair[1].position > pair[0].position && pair[0].speed + pair[1].speed <= 0.0 {
                return Err(PhysicsError::InvalidEnvelope(
                    "train cannot cover distance at zero speed",
                ));
            }
        }
        let end = points[points.len() - 1].position;
        if end <= 0.0 {
            return Err(PhysicsError::InvalidEnvelope("envelope has no length"));
        }
        Ok(Self { points })
    }

    /// Build an envelope from speeds sampled at positions, deriving times.
    pub fn from_speeds(positions: &[f64], speeds: &[f64]) -> Result<Self, PhysicsError> {
        if positions.len() != speeds.len() {
            return Err(PhysicsError::InvalidEnvelope(
                "positions and speeds differ in length",
            ));
        }

        let mut points = Vec::with_capacity(positions.len());
        let mut time = 0.0;
        for (i, (&position, &speed)) in positions.iter().zip(speeds).enumerate() {
            if i > 0 {
                let dx = position - positions[i - 1];
                if dx > 0.0 {
                    let mean = speeds[i - 1] + speed;
                    if mean <= 0.0 {
                        return Err(PhysicsError::InvalidEnvelope(
                            "train cannot cover distance at zero speed",
                        ));
                    }
                    time += 2.0 * dx / mean;
                }
            }
            points.push(EnvelopePoint {
                position,
                speed,
                time,
            });
        }
        Self::new(points)
    }

    /// A trajectory at constant speed over `length` metres.
    pub fn constant_speed(length: f64, speed: f64) -> Result<Self, PhysicsError> {
        Self::from_speeds(&[0.0, length], &[speed, speed])
    }

    /// The envelope points.
    pub fn points(&self) -> &[EnvelopePoint] {
        &self.points
    }

    /// Speed when the head reaches `position`.
    pub fn interpolate_speed(&self, position: f64) -> f64 {
        match self.segment(position) {
            None => self.points[0].speed,
            Some((a, b)) => {
                let frac = (position - a.position) / (b.position - a.position);
                interpolated_speed(a, b, frac)
            }
        }
    }

    /// Copy of this envelope with interpolated points inserted at
    /// `positions`, so that each of them is a point boundary.
    pub fn with_breakpoints(&self, positions: &[f64]) -> Self {
        let end = self.end_pos();
        let mut cuts: Vec<f64> = positions
            .iter()
            .copied()
            .filter(|&p| p > 0.0 && p < end)
            .collect();
        cuts.sort_by(f64::total_cmp);
        cuts.dedup();

        let mut points = Vec::with_capacity(self.points.len() + cuts.len());
        let mut cuts = cuts.into_iter().peekable();
        for (i, point) in self.points.iter().enumerate() {
            while let Some(&cut) = cuts.peek() {
                if cut > point.position {
                    break;
                }
                cuts.next();
                if cut < point.position && i > 0 {
                    points.push(EnvelopePoint {
                        position: cut,
                        speed: self.interpolate_speed(cut),
                        time: self.interpolate_total_time(cut),
                    });
                }
            }
            points.push(*point);
        }
        Self { points }
    }

    /// Segment `(a, b)` with `a.position < position <= b.position`, or `None`
    /// when `position` is at or before the start.
    fn segment(&self, position: f64) -> Option<(&EnvelopePoint, &EnvelopePoint)> {
        let idx = self.points.partition_point(|p| p.position < position);
        if idx == 0 {
            return None;
        }
        let idx = idx.min(self.points.len() - 1);
        Some((&self.points[idx - 1], &self.points[idx]))
    }
}

fn interpolated_speed(a: &EnvelopePoint, b: &EnvelopePoint, frac: f64) -> f64 {
    let v_sq = a.speed * a.speed + (b.speed * b.speed - a.speed * a.speed) * frac;
    v_sq.max(0.0).sqrt()
}

impl TimeInterpolate for Envelope {
    fn interpolate_total_time(&self, position: f64) -> f64 {
        debug_assert!(
            position >= -1e-9 && position <= self.end_pos() + 1e-9,
            "position {position} outside envelope"
        );
        let Some((a, b)) = self.segment(position) else {
            return self.points[0].time;
        };
        if position >= b.position {
            return b.time;
        }

        let dx = b.position - a.position;
        let travelled = position - a.position;
        let v = interpolated_speed(a, b, travelled / dx);
        if a.speed + v <= 0.0 {
            return a.time;
        }
        // Scale to the stored segment duration, so that envelopes whose
        // times were reshaped by an allowance stay consistent at the points.
        let nominal = 2.0 * dx / (a.speed + b.speed);
        let partial = 2.0 * travelled / (a.speed + v);
        a.time + (b.time - a.time) * (partial / nominal)
    }

    fn end_pos(&self) -> f64 {
        self.points[self.points.len() - 1].position
    }

    fn total_time(&self) -> f64 {
        self.points[self.points.len() - 1].time
    }

    fn end_speed(&self) -> f64 {
        self.points[self.points.len() - 1].speed
    }
}
