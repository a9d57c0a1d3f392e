//! Tier and round configuration.

use std::time::Duration;

use drawhall_protocol::{Pattern, Tier, duration_ms};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TierConfig
// ---------------------------------------------------------------------------

/// Per-tier settings: draw cadence, room capacity, stake and the patterns
/// that count as a win.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// Time between two draws.
    #[serde(with = "duration_ms")]
    pub draw_interval: Duration,

    /// Participants needed before the wait-for-more timer starts.
    pub min_participants: usize,

    /// Hard cap. A room that fills up starts immediately.
    pub max_participants: usize,

    /// Stake each participant puts in, refunded if the round is abandoned
    /// through no fault of theirs.
    pub stake: u64,

    /// Patterns a claim may use in this tier.
    pub patterns: Vec<Pattern>,
}

impl TierConfig {
    pub fn easy() -> Self {
        Self {
            draw_interval: Duration::from_millis(5000),
            min_participants: 2,
            max_participants: 8,
            stake: 10,
            patterns: vec![
                Pattern::Row,
                Pattern::Column,
                Pattern::Diagonal,
                Pattern::FullHouse,
            ],
        }
    }

    pub fn medium() -> Self {
        Self {
            draw_interval: Duration::from_millis(4000),
            stake: 25,
            patterns: vec![Pattern::Row, Pattern::Column, Pattern::FullHouse],
            ..Self::easy()
        }
    }

    pub fn hard() -> Self {
        Self {
            draw_interval: Duration::from_millis(3000),
            stake: 50,
            patterns: vec![Pattern::Diagonal, Pattern::FullHouse],
            ..Self::easy()
        }
    }

    pub fn unbeatable() -> Self {
        Self {
            draw_interval: Duration::from_millis(2000),
            stake: 100,
            patterns: vec![Pattern::FullHouse],
            ..Self::easy()
        }
    }

    pub fn accepts(&self, pattern: Pattern) -> bool {
        self.patterns.contains(&pattern)
    }

    /// Fixes bounds that would make a room impossible to start.
    pub fn validated(mut self) -> Self {
        self.min_participants = self.min_participants.max(1);
        self.max_participants = self.max_participants.max(self.min_participants);
        if self.draw_interval.is_zero() {
            self.draw_interval = Duration::from_millis(1);
        }
        self
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self::easy()
    }
}

/// One [`TierConfig`] per [`Tier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTable {
    pub easy: TierConfig,
    pub medium: TierConfig,
    pub hard: TierConfig,
    pub unbeatable: TierConfig,
}

impl TierTable {
    pub fn get(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Easy => &self.easy,
            Tier::Medium => &self.medium,
            Tier::Hard => &self.hard,
            Tier::Unbeatable => &self.unbeatable,
        }
    }

    pub fn get_mut(&mut self, tier: Tier) -> &mut TierConfig {
        match tier {
            Tier::Easy => &mut self.easy,
            Tier::Medium => &mut self.medium,
            Tier::Hard => &mut self.hard,
            Tier::Unbeatable => &mut self.unbeatable,
        }
    }

    pub fn validated(self) -> Self {
        Self {
            easy: self.easy.validated(),
            medium: self.medium.validated(),
            hard: self.hard.validated(),
            unbeatable: self.unbeatable.validated(),
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            easy: TierConfig::easy(),
            medium: TierConfig::medium(),
            hard: TierConfig::hard(),
            unbeatable: TierConfig::unbeatable(),
        }
    }
}

// ---------------------------------------------------------------------------
// RoundConfig
// ---------------------------------------------------------------------------

/// Settings for the round coordinator itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// How long a disconnected participant keeps their seat.
    #[serde(with = "duration_ms")]
    pub reconnect_grace: Duration,

    /// How long a finished round stays readable before eviction.
    #[serde(with = "duration_ms")]
    pub retention: Duration,

    /// Global difficulty. The draw planner only engages at `Unbeatable`.
    pub difficulty: Tier,

    /// Seeds dealing and drawing. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
            retention: Duration::from_secs(60),
            difficulty: Tier::Easy,
            rng_seed: None,
        }
    }
}
