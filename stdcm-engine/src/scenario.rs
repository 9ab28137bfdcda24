//! Self-contained search scenarios loaded from JSON.
//!
//! A scenario carries everything a search needs: the blocks of a small
//! network, the train, its waypoints, the windows other trains already
//! hold and the search configuration. Blocks are referred to by their
//! index in `blocks`; clock times are either `"HH:MM:SS"` strings or
//! seconds since midnight.

use std::path::Path;

use chrono::{NaiveTime, Timelike};
use serde::Deserialize;
use tracing::info;

use crate::conflicts::{LedgerAvailability, LedgerError, OccupancyLedger, Reservation};
use crate::infra::{BlockGraph, BlockId, DetectorId, InfraError};
use crate::physics::{AllowanceValue, MaxSpeedSimulator, RollingStock};
use crate::stdcm::{
    BlockLocation, Planner, StdcmConfig, StdcmError, StdcmRequest, StdcmResult, Step,
};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Errors raised while loading or running a scenario.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScenarioError {
    /// Scenario file could not be read
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    /// Scenario is not valid JSON for this format
    #[error("invalid scenario: {0}")]
    Json(String),

    /// Clock time is not `HH:MM:SS`
    #[error("invalid clock time {0:?}, expected HH:MM:SS")]
    InvalidTime(String),

    /// Block index outside `blocks`
    #[error("unknown block index {0}")]
    UnknownBlock(usize),

    /// Network could not be built
    #[error(transparent)]
    Infra(#[from] InfraError),

    /// Reservation could not be recorded
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Search failed
    #[error(transparent)]
    Search(#[from] StdcmError),
}

/// A time of day, as text or as seconds since midnight.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ClockTime {
    Seconds(f64),
    Text(String),
}

impl ClockTime {
    /// Seconds since midnight.
    pub fn seconds(&self) -> Result<f64, ScenarioError> {
        match self {
            ClockTime::Seconds(seconds) => Ok(*seconds),
            ClockTime::Text(text) => parse_clock(text),
        }
    }
}

/// Parse `"HH:MM:SS"` into seconds since midnight.
pub fn parse_clock(text: &str) -> Result<f64, ScenarioError> {
    let time = NaiveTime::parse_from_str(text, "%H:%M:%S")
        .map_err(|_| ScenarioError::InvalidTime(text.to_string()))?;
    Ok(f64::from(time.num_seconds_from_midnight()))
}

/// Format seconds since midnight as `"HH:MM:SS"`, with a day suffix past
/// midnight.
///
/// ```
/// use stdcm_engine::scenario::format_clock;
///
/// assert_eq!(format_clock(29_100.4), "08:05:00");
/// assert_eq!(format_clock(90_000.0), "01:00:00 (+1d)");
/// ```
pub fn format_clock(seconds: f64) -> String {
    let rounded = seconds.round().max(0.0);
    let days = (rounded / SECONDS_PER_DAY).floor();
    let in_day = (rounded - days * SECONDS_PER_DAY) as u32;
    let text = NaiveTime::from_num_seconds_from_midnight_opt(in_day, 0)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| format!("{in_day}s"));
    if days > 0.0 {
        format!("{text} (+{days}d)")
    } else {
        text
    }
}

/// A block between two detectors.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockSpec {
    pub entry: u32,
    pub exit: u32,
    pub length: f64,
}

/// A location given by block index.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationSpec {
    pub block: usize,
    pub offset: f64,
}

/// A waypoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepSpec {
    pub locations: Vec<LocationSpec>,
    #[serde(default)]
    pub stop_duration: Option<f64>,
}

/// A window held by another train.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReservationSpec {
    pub block: usize,
    pub start: ClockTime,
    pub end: ClockTime,
    #[serde(default)]
    pub owner: Option<String>,
}

/// A complete search scenario.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    pub blocks: Vec<BlockSpec>,
    pub rolling_stock: RollingStock,
    pub steps: Vec<StepSpec>,
    pub departure_time: ClockTime,
    #[serde(default)]
    pub standard_allowance: Option<AllowanceValue>,
    #[serde(default)]
    pub reservations: Vec<ReservationSpec>,
    #[serde(default)]
    pub config: StdcmConfig,
}

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ScenarioError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Parse a scenario from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        serde_json::from_str(json).map_err(|e| ScenarioError::Json(e.to_string()))
    }

    /// Build the network, returning it with the id of every block index.
    pub fn infra(&self) -> Result<(BlockGraph, Vec<BlockId>), ScenarioError> {
        let mut graph = BlockGraph::new();
        let ids = self
            .blocks
            .iter()
            .map(|b| graph.add_block(DetectorId(b.entry), DetectorId(b.exit), b.length))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((graph, ids))
    }

    /// Record the reservations of other trains.
    pub fn ledger(&self, ids: &[BlockId]) -> Result<OccupancyLedger, ScenarioError> {
        let mut ledger = OccupancyLedger::new();
        for spec in &self.reservations {
            let block = block_id(ids, spec.block)?;
            let mut reservation = Reservation::new(block, spec.start.seconds()?, spec.end.seconds()?);
            if let Some(owner) = &spec.owner {
                reservation = reservation.with_owner(owner.clone());
            }
            ledger.reserve(reservation)?;
        }
        Ok(ledger)
    }

    /// Build the search request.
    pub fn request(&self, ids: &[BlockId]) -> Result<StdcmRequest, ScenarioError> {
        let steps = self
            .steps
            .iter()
            .map(|spec| {
                let locations = spec
                    .locations
                    .iter()
                    .map(|l| Ok(BlockLocation::new(block_id(ids, l.block)?, l.offset)))
                    .collect::<Result<Vec<_>, ScenarioError>>()?;
                Ok(Step {
                    locations,
                    stop_duration: spec.stop_duration,
                })
            })
            .collect::<Result<Vec<_>, ScenarioError>>()?;

        let mut request = StdcmRequest::new(
            steps,
            self.rolling_stock.clone(),
            self.departure_time.seconds()?,
        );
        request.standard_allowance = self.standard_allowance;
        Ok(request)
    }

    /// Run the search described by the scenario.
    pub fn run(&self) -> Result<StdcmResult, ScenarioError> {
        let (infra, ids) = self.infra()?;
        let ledger = self.ledger(&ids)?;
        let request = self.request(&ids)?;
        info!(
            blocks = infra.len(),
            reservations = ledger.len(),
            "Scenario loaded"
        );

        let availability = LedgerAvailability::new(
            &infra,
            &ledger,
            request.rolling_stock.length,
            self.config.sight_distance,
        );
        let simulator = MaxSpeedSimulator::new(self.config.position_step);
        let planner = Planner::new(&infra, &availability, &simulator, &self.config);
        Ok(planner.search(&request)?)
    }
}

fn block_id(ids: &[BlockId], index: usize) -> Result<BlockId, ScenarioError> {
    ids.get(index)
        .copied()
        .ok_or(ScenarioError::UnknownBlock(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const LINE: &str = r#"{
        "blocks": [
            { "entry": 0, "exit": 1, "length": 1000.0 },
            { "entry": 1, "exit": 2, "length": 1000.0 },
            { "entry": 2, "exit": 3, "length": 1000.0 }
        ],
        "rolling_stock": {
            "length": 100.0,
            "max_speed": 30.0,
            "acceleration": 0.5,
            "deceleration": 0.5
        },
        "steps": [
            { "locations": [{ "block": 0, "offset": 0.0 }] },
            { "locations": [{ "block": 2, "offset": 1000.0 }], "stop_duration": 0.0 }
        ],
        "departure_time": "08:00:00",
        "reservations": [
            { "block": 0, "start": "08:00:00", "end": 29100, "owner": "freight 7" }
        ]
    }"#;

    #[test]
    fn parse_scenario() {
        let scenario = Scenario::from_json(LINE).unwrap();

        assert_eq!(scenario.blocks.len(), 3);
        assert_eq!(scenario.steps[0].stop_duration, None);
        assert_eq!(scenario.steps[1].stop_duration, Some(0.0));
        assert_eq!(scenario.departure_time.seconds().unwrap(), 28_800.0);
        assert_eq!(scenario.reservations[0].end.seconds().unwrap(), 29_100.0);
        assert_eq!(scenario.config, StdcmConfig::default());
        assert_eq!(scenario.standard_allowance, None);
    }

    #[test]
    fn run_scenario() {
        let result = Scenario::from_json(LINE).unwrap().run().unwrap();

        assert!((result.departure_time - 29_100.0).abs() < 1e-6);
        assert_eq!(result.path.blocks, vec![BlockId(0), BlockId(1), BlockId(2)]);
        assert_eq!(format_clock(result.departure_time), "08:05:00");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LINE.as_bytes()).unwrap();

        let scenario = Scenario::from_path(file.path()).unwrap();
        assert_eq!(scenario.steps.len(), 2);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Scenario::from_path(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ScenarioError::Io { .. }));
    }

    #[test]
    fn unknown_block_index() {
        let json = LINE.replace(r#""block": 2, "offset": 1000.0"#, r#""block": 9, "offset": 1000.0"#);
        let scenario = Scenario::from_json(&json).unwrap();

        let err = scenario.run().unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownBlock(9)));
    }

    #[test]
    fn clock_times() {
        assert_eq!(parse_clock("00:00:00").unwrap(), 0.0);
        assert_eq!(parse_clock("23:59:59").unwrap(), 86_399.0);
        assert!(matches!(
            parse_clock("8h15"),
            Err(ScenarioError::InvalidTime(_))
        ));
        assert_eq!(format_clock(0.0), "00:00:00");
        assert_eq!(format_clock(3661.0), "01:01:01");
        assert_eq!(format_clock(2.0 * SECONDS_PER_DAY + 60.0), "00:01:00 (+2d)");
    }

    #[test]
    fn invalid_json() {
        let err = Scenario::from_json("{ \"blocks\": [] }").unwrap_err();
        assert!(matches!(err, ScenarioError::Json(_)));
    }

    #[test]
    fn error_display() {
        let err = ScenarioError::InvalidTime("8h15".into());
        assert_eq!(err.to_string(), "invalid clock time \"8h15\", expected HH:MM:SS");

        let err = ScenarioError::UnknownBlock(4);
        assert_eq!(err.to_string(), "unknown block index 4");

        let err = ScenarioError::Search(StdcmError::NoPathFound);
        assert_eq!(err.to_string(), "no path found");
    }
}
