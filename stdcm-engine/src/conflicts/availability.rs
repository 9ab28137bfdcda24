//! Availability results and the oracle contract.

use serde::Serialize;

use crate::infra::BlockId;
use crate::physics::TimeInterpolate;

/// Answer to an availability query over a section of path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Availability {
    /// The section can be used as simulated.
    ///
    /// For example, if the section is occupied from 42 to 90 and the next
    /// reservation on any of its blocks starts at 100, the entry can be
    /// delayed by up to 10 seconds and the next conflict is at 100.
    Available {
        /// Extra delay that can be added without creating a conflict (s).
        maximum_delay: f64,
        /// Earliest start of another reservation after this use (s).
        time_of_next_conflict: f64,
    },

    /// Running the section as simulated conflicts with a reservation.
    Unavailable {
        /// Minimum delay that clears every conflict (s).
        duration: f64,
        /// Offset of the first violated boundary, on the block path (m).
        first_conflict_offset: f64,
    },

    /// The outcome depends on which block follows the given ones.
    NotEnoughLookahead,
}

impl Availability {
    /// Returns true for [`Availability::Available`].
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available { .. })
    }
}

/// Resource occupancy oracle.
///
/// Offsets are positions of the train's head along `blocks`, measured from
/// the start of the first block. `envelope` covers `[start_offset,
/// end_offset]` with its position zero at `start_offset` and its time zero at
/// `start_time`. Implementations account for train length and sighting
/// distance themselves, and never mutate the reservations they read.
pub trait BlockAvailability {
    /// Check whether the section `[start_offset, end_offset]` can be used.
    fn get_availability(
        &self,
        blocks: &[BlockId],
        start_offset: f64,
        end_offset: f64,
        envelope: &dyn TimeInterpolate,
        start_time: f64,
    ) -> Availability;
}

impl<T: BlockAvailability + ?Sized> BlockAvailability for &T {
    fn get_availability(
        &self,
        blocks: &[BlockId],
        start_offset: f64,
        end_offset: f64,
        envelope: &dyn TimeInterpolate,
        start_time: f64,
    ) -> Availability {
        (**self).get_availability(blocks, start_offset, end_offset, envelope, start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustive_match() {
        let results = [
            Availability::Available {
                maximum_delay: 10.0,
                time_of_next_conflict: 100.0,
            },
            Availability::Unavailable {
                duration: 5.0,
                first_conflict_offset: 250.0,
            },
            Availability::NotEnoughLookahead,
        ];
        let kinds: Vec<&str> = results
            .iter()
            .map(|r| match r {
                Availability::Available { .. } => "available",
                Availability::Unavailable { .. } => "unavailable",
                Availability::NotEnoughLookahead => "lookahead",
            })
            .collect();

        assert_eq!(kinds, ["available", "unavailable", "lookahead"]);
        assert!(results[0].is_available());
        assert!(!results[1].is_available());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_string(&Availability::Unavailable {
            duration: 5.0,
            first_conflict_offset: 250.0,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"kind":"unavailable","duration":5.0,"first_conflict_offset":250.0}"#
        );
    }
}
