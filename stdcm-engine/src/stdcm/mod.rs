//! Train path planner using A* search.
//!
//! This module answers: "given the trains already scheduled, when and where
//! can this new train run from its origin to its destination?"
//!
//! The search explores blocks and departure times together. A backward
//! relaxation first bounds the time left from every block, then A* extends
//! the train block by block, shifting its departure whenever a block is
//! reserved. The path found is finally re-simulated as a whole, with its
//! standard allowance spread so that it still avoids every reservation.

mod config;
mod error;
mod graph;
mod heuristic;
mod path;
mod search;
mod standard_allowance;
mod step;


pub use config::StdcmConfig;
pub use error::StdcmError;
pub use graph::{EdgeId, SearchEdge, SearchGraph, SearchNode};
pub use heuristic::{StdcmHeuristic, WaypointHeuristic};
pub use path::{ExploredRange, StdcmPath};
pub use search::{Planner, StdcmRequest, StdcmResult};
pub use standard_allowance::{FinalEnvelope, FixedPoints, FixedTimePoint, build_final_envelope};
pub use step::{BlockLocation, Step};
