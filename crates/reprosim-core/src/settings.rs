//! Runtime-adjustable simulation settings.
//!
//! Time multipliers are not compile-time constants: the driver may change
//! reproductive speed while the game runs. Changes take effect at the next
//! `update` call; a span already in flight completes under the multipliers
//! read at its start.

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Conversion rates between external time and reproductive time, plus the
/// per-category reproductive speed multipliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Reproductive minutes per external clock tick.
    external_tick_minutes: f64,
    /// Speed multiplier for cycle, ovum, and sperm trackers.
    cycle_speed: f64,
    /// Speed multiplier for pregnancy (may differ from the cycle category).
    pregnancy_speed: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            external_tick_minutes: 1.0,
            cycle_speed: 1.0,
            pregnancy_speed: 1.0,
        }
    }
}

impl Settings {
    pub fn external_tick_minutes(&self) -> f64 {
        self.external_tick_minutes
    }

    pub fn cycle_speed(&self) -> f64 {
        self.cycle_speed
    }

    pub fn pregnancy_speed(&self) -> f64 {
        self.pregnancy_speed
    }

    pub fn set_external_tick_minutes(&mut self, value: f64) -> Result<(), SettingsError> {
        Self::positive("external_tick_minutes", value)?;
        self.external_tick_minutes = value;
        Ok(())
    }

    pub fn set_cycle_speed(&mut self, value: f64) -> Result<(), SettingsError> {
        Self::positive("cycle_speed", value)?;
        self.cycle_speed = value;
        Ok(())
    }

    pub fn set_pregnancy_speed(&mut self, value: f64) -> Result<(), SettingsError> {
        Self::positive("pregnancy_speed", value)?;
        self.pregnancy_speed = value;
        Ok(())
    }

    fn positive(name: &'static str, value: f64) -> Result<(), SettingsError> {
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(SettingsError::NonPositive { name, value })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_identity() {
        let s = Settings::default();
        assert_eq!(s.external_tick_minutes(), 1.0);
        assert_eq!(s.cycle_speed(), 1.0);
        assert_eq!(s.pregnancy_speed(), 1.0);
    }

    #[test]
    fn setters_accept_positive() {
        let mut s = Settings::default();
        assert!(s.set_external_tick_minutes(2.5).is_ok());
        assert!(s.set_cycle_speed(0.5).is_ok());
        assert!(s.set_pregnancy_speed(3.0).is_ok());
        assert_eq!(s.external_tick_minutes(), 2.5);
        assert_eq!(s.cycle_speed(), 0.5);
        assert_eq!(s.pregnancy_speed(), 3.0);
    }

    #[test]
    fn setters_reject_non_positive() {
        let mut s = Settings::default();
        assert!(s.set_external_tick_minutes(0.0).is_err());
        assert!(s.set_cycle_speed(-1.0).is_err());
        assert!(s.set_pregnancy_speed(f64::NAN).is_err());
        // Rejected values leave the previous setting in place.
        assert_eq!(s.cycle_speed(), 1.0);
    }
}
