//! Resource occupancy and conflict detection.
//!
//! The search asks one question over and over: "if the train runs this
//! section of path with this trajectory, does it collide with anyone?"
//! [`BlockAvailability`] is that question, [`Availability`] its answer.
//! [`LedgerAvailability`] answers it against an [`OccupancyLedger`] of other
//! trains' reserved time windows, using an [`IncrementalEnvelopeAdapter`] to
//! turn the trajectory into per-block occupancy windows.

mod availability;
mod incremental;
mod ledger;

pub use availability::{Availability, BlockAvailability};
pub use incremental::{IncrementalEnvelopeAdapter, IncrementalRequirementCallbacks};
pub use ledger::{LedgerAvailability, LedgerError, OccupancyLedger, Reservation};
