//! Timer table configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by the [`MasterClock`](crate::MasterClock) and the
/// [`TimerScheduler`](crate::TimerScheduler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Master clock period in milliseconds.
    pub tick_period_ms: u64,

    /// Hard ceiling on live registrations.
    pub max_registrations: usize,

    /// Host pressure (0.0..=1.0) above which timers are shed.
    pub pressure_threshold: f64,

    /// Sample host pressure every N ticks. 0 disables sampling.
    pub pressure_sample_every: u64,

    /// Fraction of the period at which slow ticks start being logged.
    pub budget_warn_threshold: f64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 100,
            max_registrations: 1024,
            pressure_threshold: 0.90,
            pressure_sample_every: 50,
            budget_warn_threshold: 0.80,
        }
    }
}

impl TimerConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.max(1))
    }

    /// Clamps out-of-range values instead of rejecting them.
    pub fn validated(mut self) -> Self {
        self.tick_period_ms = self.tick_period_ms.max(1);
        self.max_registrations = self.max_registrations.max(1);
        self.pressure_threshold = self.pressure_threshold.clamp(0.0, 1.0);
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timer_config() {
        let config = TimerConfig::default();
        assert_eq!(config.tick_period(), Duration::from_millis(100));
        assert_eq!(config.max_registrations, 1024);
    }

    #[test]
    fn test_validated_clamps_out_of_range_values() {
        let config = TimerConfig {
            tick_period_ms: 0,
            max_registrations: 0,
            pressure_threshold: 3.0,
            pressure_sample_every: 0,
            budget_warn_threshold: -1.0,
        }
        .validated();
        assert_eq!(config.tick_period_ms, 1);
        assert_eq!(config.max_registrations, 1);
        assert_eq!(config.pressure_threshold, 1.0);
        assert_eq!(config.budget_warn_threshold, 0.0);
    }
}
