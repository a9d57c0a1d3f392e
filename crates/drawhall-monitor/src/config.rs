//! Monitor configuration.

use std::time::Duration;

use drawhall_protocol::duration_ms;
use serde::{Deserialize, Serialize};

/// Settings for the lifecycle monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Time between two scans.
    #[serde(with = "duration_ms")]
    pub scan_interval: Duration,

    /// A round with no draw, claim or reconnect for this long is ended.
    #[serde(with = "duration_ms")]
    pub idle_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(120),
        }
    }
}
