//! Records exchanged with the persisted store.

use serde::{Deserialize, Serialize};

use drawhall_protocol::{EndReason, ParticipantId, RoomId, RoundId, RoundStatus, Tier};

/// The persisted view of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round_id: RoundId,
    pub room_id: RoomId,
    pub tier: Tier,
    pub participants: Vec<ParticipantId>,
    pub drawn: Vec<u8>,
    pub status: RoundStatus,
    /// The cross-process winner field. Written only through
    /// [`RoundStore::commit_winner_if_absent`](crate::RoundStore::commit_winner_if_absent).
    pub winner: Option<ParticipantId>,
    pub end_reason: Option<EndReason>,
    pub duration_seconds: Option<u64>,
}

/// Result of the winner compare-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinnerCommit {
    /// `true` if this call wrote the winner.
    pub committed: bool,
    /// Whoever holds the winner field after the call.
    pub winner: ParticipantId,
}

/// Final state written when a round ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub status: RoundStatus,
    pub winner: Option<ParticipantId>,
    pub reason: EndReason,
    pub drawn_count: usize,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ClaimSubmitted,
    RoomCancelled,
    StakeRefunded,
    RefundFailed,
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub round_id: Option<RoundId>,
    pub room_id: Option<RoomId>,
    pub participant_id: Option<ParticipantId>,
    pub detail: String,
}

impl AuditEntry {
    pub fn new(action: AuditAction, detail: impl Into<String>) -> Self {
        Self {
            action,
            round_id: None,
            room_id: None,
            participant_id: None,
            detail: detail.into(),
        }
    }

    pub fn round(mut self, round_id: RoundId) -> Self {
        self.round_id = Some(round_id);
        self
    }

    pub fn room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    pub fn participant(mut self, participant_id: ParticipantId) -> Self {
        self.participant_id = Some(participant_id);
        self
    }
}
