//! Engine configuration, loaded from JSON.
//!
//! Every section defaults, so a file only needs the values it changes:
//!
//! ```json
//! {
//!   "timers": { "tick_period_ms": 50 },
//!   "tiers": { "easy": { "draw_interval": 3000 } },
//!   "monitor": { "idle_timeout": 60000 }
//! }
//! ```

use std::path::{Path, PathBuf};

use drawhall_lobby::PoolConfig;
use drawhall_monitor::MonitorConfig;
use drawhall_protocol::DEFAULT_EVENT_CAPACITY;
use drawhall_round::{RoundConfig, TierTable};
use drawhall_tick::TimerConfig;
use serde::{Deserialize, Serialize};

/// Errors loading an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Everything the engine needs, one section per component.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub timers: TimerConfig,
    pub tiers: TierTable,
    pub round: RoundConfig,
    pub pool: PoolConfig,
    pub monitor: MonitorConfig,
    pub engine: LoopConfig,
}

/// Settings for the engine task itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Commands buffered between handles and the engine task.
    pub command_buffer: usize,

    /// Events buffered per broadcast channel before slow subscribers lag.
    pub event_capacity: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            command_buffer: 256,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Clamps out-of-range values in every section.
    pub fn validated(mut self) -> Self {
        self.timers = self.timers.validated();
        self.tiers = self.tiers.validated();
        self.engine.command_buffer = self.engine.command_buffer.max(1);
        self.engine.event_capacity = self.engine.event_capacity.max(1);
        self
    }
}
