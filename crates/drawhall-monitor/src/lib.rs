//! Lifecycle monitoring for Drawhall.
//!
//! The [`LifecycleMonitor`] ends rounds that went idle, cancels their rooms
//! and returns stakes exactly once per participant. It also sweeps up after
//! failures elsewhere: final writes that did not land, disconnect deadlines
//! that never got a timer, and rounds that were never evicted.

mod config;
mod monitor;

pub use config::MonitorConfig;
pub use monitor::{LifecycleMonitor, ScanReport};
