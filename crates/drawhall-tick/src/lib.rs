//! One clock, many timers.
//!
//! Drawhall never spawns a task or a sleep per round. Instead:
//!
//! - a single [`MasterClock`] wakes at a fixed period, and
//! - a [`TimerScheduler`] holds one row per logical timer (draw cadence,
//!   countdown, reconnect grace, eviction) and, on every tick, returns the
//!   keys that are due.
//!
//! The scheduler is generic over its key type and knows nothing about
//! rounds. It also owns the registration ceiling and the pressure-driven
//! shedding of idle timers, sampled through a [`PressureProbe`].

mod clock;
mod config;
mod pressure;
mod scheduler;

pub use clock::{ClockMetrics, ClockTick, MasterClock};
pub use config::TimerConfig;
pub use pressure::{FixedPressure, MemInfoProbe, PressureProbe};
pub use scheduler::{Registration, TimerScheduler};
