//! Error types for the matchmaking layer.

use drawhall_protocol::{ParticipantId, RoomId};
use drawhall_round::RoundError;

/// Errors from [`MatchmakingPool`](crate::MatchmakingPool) operations.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// A participant waits in at most one room at a time.
    #[error("participant {0} already queued in room {1}")]
    AlreadyQueued(ParticipantId, RoomId),

    #[error("participant {0} not in room {1}")]
    NotInRoom(ParticipantId, RoomId),

    /// The timer scheduler is at its ceiling. Try again later.
    #[error("timer capacity exhausted")]
    ResourceExhausted,

    /// Starting the round failed. The room stays queued.
    #[error(transparent)]
    Round(#[from] RoundError),
}
