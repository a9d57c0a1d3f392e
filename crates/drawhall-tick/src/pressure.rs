//! Host pressure sampling for timer shedding.

use std::path::PathBuf;

/// Reports how loaded the host is, from `0.0` (idle) to `1.0` (exhausted).
pub trait PressureProbe: Send {
    /// Returns `None` if the reading is unavailable on this host.
    fn sample(&mut self) -> Option<f64>;
}

/// Memory pressure from `/proc/meminfo`: `1 - MemAvailable / MemTotal`.
///
/// On hosts without procfs every sample is `None`, which disables shedding.
#[derive(Debug, Clone)]
pub struct MemInfoProbe {
    path: PathBuf,
}

impl MemInfoProbe {
    pub fn new() -> Self {
        Self::with_path("/proc/meminfo")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MemInfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl PressureProbe for MemInfoProbe {
    fn sample(&mut self) -> Option<f64> {
        let text = std::fs::read_to_string(&self.path).ok()?;
        parse_meminfo(&text)
    }
}

fn parse_meminfo(text: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        text.lines()
            .find(|line| line.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse::<f64>()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }
    Some((1.0 - available / total).clamp(0.0, 1.0))
}

/// A probe that always reports the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedPressure(pub f64);

impl PressureProbe for FixedPressure {
    fn sample(&mut self) -> Option<f64> {
        Some(self.0)
    }
}
