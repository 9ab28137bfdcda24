//! Train physics: rolling stock, speed/time envelopes and allowances.
//!
//! An [`Envelope`] is the simulated trajectory of the train's head over a
//! path, expressed as speed and time at increasing positions. The search
//! produces them with a [`Simulator`], the conflict oracle reads times from
//! them through [`TimeInterpolate`], and the final schedule is shaped by
//! applying allowances (scheduled slack) to them.

mod allowance;
mod envelope;
mod error;
mod rolling_stock;
mod simulator;
mod stops;

pub use allowance::{
    AllowanceDistribution, AllowanceError, AllowanceRange, AllowanceValue, apply_allowance,
};
pub use envelope::{Envelope, EnvelopePoint, TimeInterpolate};
pub use error::PhysicsError;
pub use rolling_stock::RollingStock;
pub use simulator::{MaxSpeedSimulator, SimContext, Simulator};
pub use stops::{EnvelopeWithStops, TrainStop};
