//! Pool configuration and the waiting-room phase machine.

use std::time::Duration;

use drawhall_protocol::{RoundId, RoundStatus, duration_ms};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PoolConfig
// ---------------------------------------------------------------------------

/// Settings for the matchmaking pool.
///
/// Per-tier room bounds live in the [`TierTable`](drawhall_round::TierTable)
/// the pool is built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// How long a room that reached its minimum waits for more players
    /// before counting down.
    #[serde(with = "duration_ms")]
    pub wait_for_players: Duration,

    /// Length of the countdown, in one-second steps. Zero starts the round
    /// as soon as the wait elapses.
    pub countdown_secs: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            wait_for_players: Duration::from_secs(10),
            countdown_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomPhase
// ---------------------------------------------------------------------------

/// Where a waiting room is on its way to a round.
///
/// ```text
/// Gathering ⇄ WaitingForMore ⇄ CountingDown(n) → Started
/// ```
///
/// Dropping below the minimum sends a room back to `Gathering`. That only
/// ever touches the room: no round exists until `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RoomPhase {
    /// Below the minimum.
    Gathering,
    /// Minimum met, wait-for-more-players timer running.
    WaitingForMore,
    /// Countdown running.
    CountingDown { seconds_remaining: u32 },
    /// Handed to the round coordinator. Only seen in snapshots returned
    /// by the call that started the round.
    Started { round_id: RoundId },
}

impl RoomPhase {
    /// The round status this phase corresponds to.
    pub fn status(self) -> RoundStatus {
        match self {
            Self::Gathering | Self::WaitingForMore => RoundStatus::Waiting,
            Self::CountingDown { .. } => RoundStatus::Starting,
            Self::Started { .. } => RoundStatus::InProgress,
        }
    }

    /// Whether new participants may still join.
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Started { .. })
    }

    pub fn is_counting_down(self) -> bool {
        matches!(self, Self::CountingDown { .. })
    }
}

impl std::fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gathering => write!(f, "gathering"),
            Self::WaitingForMore => write!(f, "waiting_for_more"),
            Self::CountingDown { seconds_remaining } => {
                write!(f, "counting_down({seconds_remaining})")
            }
            Self::Started { round_id } => write!(f, "started({round_id})"),
        }
    }
}
