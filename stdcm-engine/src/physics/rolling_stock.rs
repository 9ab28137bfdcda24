//! Rolling stock characteristics.

use serde::{Deserialize, Serialize};

use super::PhysicsError;

/// Physical characteristics of the train being scheduled.
///
/// All values are in SI units: metres, metres per second and metres per
/// second squared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingStock {
    /// Train length (m).
    pub length: f64,

    /// Maximum speed (m/s).
    pub max_speed: f64,

    /// Constant traction acceleration (m/s²).
    pub acceleration: f64,

    /// Constant service braking deceleration, as a positive value (m/s²).
    pub deceleration: f64,
}

impl RollingStock {
    /// Create a new rolling stock description.
    pub fn new(length: f64, max_speed: f64, acceleration: f64, deceleration: f64) -> Self {
        Self {
            length,
            max_speed,
            acceleration,
            deceleration,
        }
    }

    /// Check every characteristic is positive and finite.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        fn positive(value: f64) -> bool {
            value.is_finite() && value > 0.0
        }

        if !positive(self.length) {
            return Err(PhysicsError::InvalidRollingStock(
                "length must be positive",
            ));
        }
        if !positive(self.max_speed) {
            return Err(PhysicsError::InvalidRollingStock(
                "max speed must be positive",
            ));
        }
        if !positive(self.acceleration) {
            return Err(PhysicsError::InvalidRollingStock(
                "acceleration must be positive",
            ));
        }
        if !positive(self.deceleration) {
            return Err(PhysicsError::InvalidRollingStock(
                "deceleration must be positive",
            ));
        }
        Ok(())
    }

    /// Lower bound on the time needed to cover `distance` metres.
    pub fn min_time(&self, distance: f64) -> f64 {
        distance / self.max_speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_sane_values() {
        let rs = RollingStock::new(400.0, 44.0, 0.5, 0.7);
        assert!(rs.validate().is_ok());
    }

    #[test]
    fn validate_rejects_each_field() {
        let base = RollingStock::new(400.0, 44.0, 0.5, 0.7);

        let mut rs = base.clone();
        rs.length = 0.0;
        assert!(rs.validate().is_err());

        let mut rs = base.clone();
        rs.max_speed = f64::INFINITY;
        assert!(rs.validate().is_err());

        let mut rs = base.clone();
        rs.acceleration = -1.0;
        assert!(rs.validate().is_err());

        let mut rs = base;
        rs.deceleration = f64::NAN;
        assert!(rs.validate().is_err());
    }

    #[test]
    fn min_time_uses_max_speed() {
        let rs = RollingStock::new(100.0, 100.0, 1.0, 1.0);
        assert_eq!(rs.min_time(1000.0), 10.0);
    }

    #[test]
    fn deserialize_from_json() {
        let rs: RollingStock = serde_json::from_str(
            r#"{"length": 200.0, "max_speed": 40.0, "acceleration": 0.6, "deceleration": 0.8}"#,
        )
        .unwrap();
        assert_eq!(rs, RollingStock::new(200.0, 40.0, 0.6, 0.8));
    }
}
