//! Core vocabulary shared by every Drawhall crate.
//!
//! Everything in this module is small, `Copy` where possible, and
//! serializable, because these values travel inside outbound events and
//! persisted records as well as through the engine itself.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a participant (human or bot).
///
/// Newtype over `u64` so a `ParticipantId` can never be passed where a
/// `RoomId` or `RoundId` is expected. `#[serde(transparent)]` keeps the
/// JSON form a plain number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A waiting room in the matchmaking pool. One room becomes one round.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// A round, as assigned by the persisted store when the round is opened.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoundId(pub u64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Difficulty tier. Selects draw cadence, room capacity, stake and the
/// patterns that count as a win.
///
/// The same enum doubles as the global difficulty setting: the house
/// planner only engages when that setting is [`Tier::Unbeatable`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Easy,
    Medium,
    Hard,
    Unbeatable,
}

impl Tier {
    /// Every tier, in ascending difficulty.
    pub const ALL: [Tier; 4] = [Tier::Easy, Tier::Medium, Tier::Hard, Tier::Unbeatable];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::Unbeatable => "unbeatable",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// A winning shape on a 5×5 board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Row,
    Column,
    Diagonal,
    FullHouse,
}

impl Pattern {
    /// Scan order used wherever "first match" matters.
    pub const PRIORITY: [Pattern; 4] = [
        Pattern::Row,
        Pattern::Column,
        Pattern::Diagonal,
        Pattern::FullHouse,
    ];
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Row => "row",
            Self::Column => "column",
            Self::Diagonal => "diagonal",
            Self::FullHouse => "full_house",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// RoundStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a round. Transitions only move forward:
///
/// ```text
/// Waiting → Starting → InProgress → Finished
///                                 ↘ Abandoned
/// ```
///
/// `Waiting` and `Starting` belong to the matchmaking pool; the round
/// coordinator only ever sees `InProgress` and the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Waiting,
    Starting,
    InProgress,
    Finished,
    Abandoned,
}

impl RoundStatus {
    /// Returns `true` for `Finished` and `Abandoned`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Abandoned)
    }

    /// Returns `true` if moving to `target` is a legal forward step.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Starting)
                | (Self::Starting, Self::InProgress)
                | (Self::InProgress, Self::Finished)
                | (Self::InProgress, Self::Abandoned)
        )
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Starting => "starting",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
            Self::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// A participant's role inside a round, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Active,
    Disconnected,
    Finished,
    Spectator,
}

// ---------------------------------------------------------------------------
// Reasons
// ---------------------------------------------------------------------------

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A claim was adjudicated as the winner.
    Winner,
    NumbersExhausted,
    AllPlayersLeft,
    LastPlayerStanding,
    IdleTimeout,
    /// The round's timer handler failed.
    Error,
    /// Shed by the scheduler under host pressure.
    ResourceCleanup,
    Shutdown,
}

impl EndReason {
    /// Rounds ending for these reasons are `Abandoned`, the rest `Finished`.
    pub fn is_abandonment(self) -> bool {
        matches!(
            self,
            Self::AllPlayersLeft
                | Self::IdleTimeout
                | Self::Error
                | Self::ResourceCleanup
                | Self::Shutdown
        )
    }

    /// Whether participants get their stakes back.
    pub fn refunds_stakes(self) -> bool {
        matches!(
            self,
            Self::IdleTimeout | Self::Error | Self::ResourceCleanup | Self::Shutdown
        )
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Winner => "winner",
            Self::NumbersExhausted => "numbers_exhausted",
            Self::AllPlayersLeft => "all_players_left",
            Self::LastPlayerStanding => "last_player_standing",
            Self::IdleTimeout => "idle_timeout",
            Self::Error => "error",
            Self::ResourceCleanup => "resource_cleanup",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Why a locally valid claim did not win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateReason {
    /// This process had already decided the round.
    AlreadyDecided,
    /// Another process committed a winner first.
    Raced,
}

/// Why a participant's slot was vacated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    Left,
    GraceExpired,
}
