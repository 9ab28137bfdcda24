//! Allowances: scheduled slack added on top of the fastest trajectory.
//!
//! An allowance is applied per [`AllowanceRange`]: each range of the path
//! must take exactly its base running time plus its added time. How the
//! extra time is spread inside a range depends on the
//! [`AllowanceDistribution`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Envelope, EnvelopePoint, PhysicsError, TimeInterpolate};

/// Tolerance on positions when matching range boundaries (m).
const POSITION_EPSILON: f64 = 1e-6;

/// Number of bisection rounds when searching a speed cap.
const BISECTION_ROUNDS: usize = 100;

/// How much slack to add to a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AllowanceValue {
    /// Percentage of the running time.
    Percentage(f64),

    /// Minutes per 100 km travelled.
    TimePerDistance(f64),
}

impl AllowanceValue {
    /// Time to add to a trajectory running `base_time` seconds over
    /// `distance` metres.
    pub fn added_time(&self, base_time: f64, distance: f64) -> f64 {
        match *self {
            AllowanceValue::Percentage(percent) => base_time * percent / 100.0,
            AllowanceValue::TimePerDistance(minutes) => minutes * 60.0 * distance / 100_000.0,
        }
    }
}

/// A path interval and the time to add on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllowanceRange {
    /// Start position (m).
    pub begin: f64,

    /// End position (m).
    pub end: f64,

    /// Seconds to add over the interval.
    pub added_time: f64,
}

impl AllowanceRange {
    /// Create a new range.
    pub fn new(begin: f64, end: f64, added_time: f64) -> Self {
        Self {
            begin,
            end,
            added_time,
        }
    }
}

/// Strategy used to spread an allowance over a range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AllowanceDistribution {
    /// Lower the top speed of the range, leaving slow sections untouched.
    /// The cap never goes below `capacity_speed_limit`.
    Mareco { capacity_speed_limit: f64 },

    /// Scale every speed of the range by the same factor.
    Linear,
}

/// Errors raised while applying an allowance.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AllowanceError {
    /// The distribution cannot slow the train down enough
    #[error("cannot add {requested:.1}s on [{begin}, {end}], at most {achievable:.1}s")]
    TooMuchTime {
        begin: f64,
        end: f64,
        requested: f64,
        achievable: f64,
    },

    /// Ranges do not tile the envelope
    #[error("allowance ranges must cover [0, {0}] without gaps")]
    InvalidRanges(f64),

    /// Resulting envelope is not a trajectory
    #[error(transparent)]
    Physics(#[from] PhysicsError),
}

/// Speed transformation applied to every point of a range.
#[derive(Debug, Clone, Copy)]
enum SpeedTransform {
    Identity,
    Scale(f64),
    Cap(f64),
}

impl SpeedTransform {
    fn apply(self, speed: f64) -> f64 {
        match self {
            SpeedTransform::Identity => speed,
            SpeedTransform::Scale(factor) => speed * factor,
            SpeedTransform::Cap(cap) => speed.min(cap),
        }
    }
}

/// Apply `ranges` of allowance to `envelope` using `distribution`.
///
/// Ranges must be contiguous and cover the whole envelope. Negative added
/// times are treated as zero.
pub fn apply_allowance(
    envelope: &Envelope,
    ranges: &[AllowanceRange],
    distribution: AllowanceDistribution,
) -> Result<Envelope, AllowanceError> {
    check_ranges(envelope.end_pos(), ranges)?;

    let boundaries: Vec<f64> = ranges.iter().map(|r| r.begin).collect();
    let envelope = envelope.with_breakpoints(&boundaries);
    let points = envelope.points();

    let mut transforms = Vec::with_capacity(ranges.len());
    for range in ranges {
        let segments = segments_in(points, range.begin, range.end);
        transforms.push(range_transform(points, &segments, range, distribution)?);
    }

    let mut out: Vec<EnvelopePoint> = Vec::with_capacity(points.len() + ranges.len());
    let mut time = 0.0;
    let mut range_idx = 0;
    for pair in points.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let dx = b.position - a.position;
        if dx <= 0.0 {
            continue;
        }
        let mid = 0.5 * (a.position + b.position);
        while range_idx + 1 < ranges.len() && mid > ranges[range_idx].end {
            range_idx += 1;
        }
        let transform = transforms[range_idx];
        let va = transform.apply(a.speed);
        let vb = transform.apply(b.speed);

        let continues = out
            .last()
            .is_some_and(|last| last.position == a.position && last.speed == va);
        if !continues {
            out.push(EnvelopePoint {
                position: a.position,
                speed: va,
                time,
            });
        }
        time += 2.0 * dx / (va + vb);
        out.push(EnvelopePoint {
            position: b.position,
            speed: vb,
            time,
        });
    }

    Ok(Envelope::new(out)?)
}

fn check_ranges(end_pos: f64, ranges: &[AllowanceRange]) -> Result<(), AllowanceError> {
    let (Some(first), Some(last)) = (ranges.first(), ranges.last()) else {
        return Err(AllowanceError::InvalidRanges(end_pos));
    };
    if first.begin.abs() > POSITION_EPSILON || (last.end - end_pos).abs() > POSITION_EPSILON {
        return Err(AllowanceError::InvalidRanges(end_pos));
    }
    let contiguous = ranges
        .windows(2)
        .all(|w| (w[0].end - w[1].begin).abs() <= POSITION_EPSILON);
    if !contiguous || ranges.iter().any(|r| r.end < r.begin) {
        return Err(AllowanceError::InvalidRanges(end_pos));
    }
    Ok(())
}

/// Indices of the segments `[i, i + 1]` of non-zero length inside `[begin, end]`.
fn segments_in(points: &[EnvelopePoint], begin: f64, end: f64) -> Vec<usize> {
    (0..points.len().saturating_sub(1))
        .filter(|&i| {
            let (a, b) = (&points[i], &points[i + 1]);
            b.position > a.position
                && a.position >= begin - POSITION_EPSILON
                && b.position <= end + POSITION_EPSILON
        })
        .collect()
}

fn time_with(points: &[EnvelopePoint], segments: &[usize], transform: SpeedTransform) -> f64 {
    segments
        .iter()
        .map(|&i| {
            let (a, b) = (&points[i], &points[i + 1]);
            let mean = transform.apply(a.speed) + transform.apply(b.speed);
            2.0 * (b.position - a.position) / mean
        })
        .sum()
}

fn range_transform(
    points: &[EnvelopePoint],
    segments: &[usize],
    range: &AllowanceRange,
    distribution: AllowanceDistribution,
) -> Result<SpeedTransform, AllowanceError> {
    let mut target = range.added_time;
    if target < 0.0 {
        debug!(
            begin = range.begin,
            end = range.end,
            added_time = target,
            "Negative allowance clamped to zero"
        );
        target = 0.0;
    }
    if target <= 1e-9 {
        return Ok(SpeedTransform::Identity);
    }

    let base = time_with(points, segments, SpeedTransform::Identity);
    let too_much = |achievable: f64| AllowanceError::TooMuchTime {
        begin: range.begin,
        end: range.end,
        requested: target,
        achievable,
    };
    if segments.is_empty() || base <= 0.0 {
        return Err(too_much(0.0));
    }

    match distribution {
        AllowanceDistribution::Linear => Ok(SpeedTransform::Scale(base / (base + target))),
        AllowanceDistribution::Mareco {
            capacity_speed_limit,
        } => {
            let top = segments
                .iter()
                .flat_map(|&i| [points[i].speed, points[i + 1].speed])
                .fold(0.0, f64::max);
            let goal = base + target;
            if top <= capacity_speed_limit {
                return Err(too_much(0.0));
            }
            let slowest = time_with(points, segments, SpeedTransform::Cap(capacity_speed_limit));
            if slowest < goal {
                return Err(too_much(slowest - base));
            }

            let (mut lo, mut hi) = (capacity_speed_limit, top);
            for _ in 0..BISECTION_ROUNDS {
                let mid = 0.5 * (lo + hi);
                if time_with(points, segments, SpeedTransform::Cap(mid)) > goal {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            Ok(SpeedTransform::Cap(0.5 * (lo + hi)))
        }
    }
}
