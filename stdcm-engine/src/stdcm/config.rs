//! Search configuration for the path finder.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration parameters for a train path search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StdcmConfig {
    /// Maximum delay that can be added to the requested departure (s).
    /// Also the weight of running time in the search cost.
    pub max_departure_delay: f64,

    /// Maximum running time from departure to arrival (s).
    /// Branches slower than this are pruned.
    pub max_run_time: f64,

    /// Sampling step of the trajectory simulation (m).
    pub position_step: f64,

    /// Lowest speed the MARECO distribution may cap a range to (m/s).
    pub capacity_speed_limit: f64,

    /// Distance before a block at which the train needs it free (m).
    pub sight_distance: f64,

    /// Maximum number of blocks explored ahead of the current one to
    /// settle an availability query.
    pub max_lookahead_blocks: usize,

    /// Maximum number of edges the search may create before giving up.
    pub max_explored_edges: usize,

    /// Maximum number of departure shifts tried for a single edge.
    pub max_delay_retries: usize,
}

impl StdcmConfig {
    /// Create a new configuration with the given search bounds and the
    /// default physics and lookahead settings.
    pub fn new(max_departure_delay: f64, max_run_time: f64) -> Self {
        Self {
            max_departure_delay,
            max_run_time,
            ..Self::default()
        }
    }

    /// Returns the maximum departure delay as a Duration.
    pub fn max_departure_delay(&self) -> Duration {
        Duration::from_secs_f64(self.max_departure_delay.max(0.0))
    }

    /// Returns the maximum running time as a Duration.
    pub fn max_run_time(&self) -> Duration {
        Duration::from_secs_f64(self.max_run_time.max(0.0))
    }

    /// Check the configuration can drive a search.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(self.max_departure_delay >= 0.0) || !self.max_departure_delay.is_finite() {
            return Err("max departure delay must be finite and non-negative");
        }
        if !(self.max_run_time > 0.0) || !self.max_run_time.is_finite() {
            return Err("max run time must be finite and positive");
        }
        if !(self.position_step > 0.0) || !self.position_step.is_finite() {
            return Err("position step must be positive");
        }
        if !(self.capacity_speed_limit > 0.0) {
            return Err("capacity speed limit must be positive");
        }
        if !(self.sight_distance >= 0.0) || !self.sight_distance.is_finite() {
            return Err("sight distance must be finite and non-negative");
        }
        Ok(())
    }
}

impl Default for StdcmConfig {
    fn default() -> Self {
        Self {
            max_departure_delay: 7200.0, // 2 hours
            max_run_time: 43200.0,       // 12 hours
            position_step: 10.0,
            capacity_speed_limit: 1.0,
            sight_distance: 400.0,
            max_lookahead_blocks: 8,
            max_explored_edges: 100_000,
            max_delay_retries: 32,
        }
    }
}
