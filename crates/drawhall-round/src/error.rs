//! Error types for the round layer.

use drawhall_protocol::{ParticipantId, RoundId, RoundStatus};
use drawhall_store::StoreError;

/// Errors from [`RoundCoordinator`](crate::RoundCoordinator) operations.
///
/// Claims never surface these: a claim always gets a
/// [`ClaimVerdict`](crate::ClaimVerdict).
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error("round {0} not found")]
    NotFound(RoundId),

    /// The operation needs an in-progress round.
    #[error("round {0} is {1}, not in progress")]
    NotInProgress(RoundId, RoundStatus),

    #[error("participant {0} not in round {1}")]
    ParticipantNotFound(ParticipantId, RoundId),

    #[error("participant {0} is not disconnected")]
    NotDisconnected(ParticipantId),

    /// The grace window closed before the participant came back.
    #[error("reconnect window for participant {0} has expired")]
    ReconnectExpired(ParticipantId),

    /// The participant left or was removed and cannot rejoin this round.
    #[error("participant {0} was removed from round {1}")]
    Removed(ParticipantId, RoundId),

    #[error("round needs at least one participant")]
    NoParticipants,

    /// The timer scheduler is at its ceiling. Try again later.
    #[error("timer capacity exhausted")]
    ResourceExhausted,

    /// A round-critical store write failed.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("invalid round transition: {from} -> {to}")]
    InvalidTransition { from: RoundStatus, to: RoundStatus },
}
