//! In-memory round state.

use std::time::Duration;

use drawhall_protocol::{
    EndReason, LeaveReason, ParticipantId, Pattern, Role, RoomId, RoundId, RoundStatus, Tier,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use drawhall_store::RoundOutcome;

use crate::board::{Board, DrawnSet};
use crate::claim::ClaimRecord;

/// Someone about to be seated in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrant {
    pub id: ParticipantId,
    pub name: String,
}

impl Entrant {
    pub fn new(id: ParticipantId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Connection sub-state of a seated participant.
///
/// Disconnecting does not remove anyone: the seat and the board stay
/// until the deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Active,
    Disconnected { deadline: Instant },
    /// Left or timed out. Never re-admitted to this round.
    Removed(LeaveReason),
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub board: Board,
    pub stake: u64,
    pub presence: Presence,
    /// Set once the stake has been returned through the store.
    pub refunded: bool,
    pub last_seen: Instant,
    pub claimed_at: Option<Instant>,
    pub claimed_pattern: Option<Pattern>,
}

impl Participant {
    pub fn role(&self) -> Role {
        match self.presence {
            Presence::Active => Role::Active,
            Presence::Disconnected { .. } => Role::Disconnected,
            Presence::Removed(_) => Role::Finished,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.presence, Presence::Active)
    }

    /// Active or within the grace window.
    pub fn holds_seat(&self) -> bool {
        matches!(
            self.presence,
            Presence::Active | Presence::Disconnected { .. }
        )
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        match self.presence {
            Presence::Disconnected { deadline } => Some(deadline),
            _ => None,
        }
    }
}

/// Authoritative state of one round inside this process.
#[derive(Debug, Clone)]
pub struct Round {
    pub id: RoundId,
    pub room_id: RoomId,
    pub tier: Tier,
    pub draw_interval: Duration,
    pub patterns: Vec<Pattern>,
    pub status: RoundStatus,
    pub drawn: DrawnSet,
    /// Seat order is join order and never changes.
    pub participants: Vec<Participant>,
    pub spectators: Vec<ParticipantId>,
    pub winner: Option<ParticipantId>,
    /// Flips false→true exactly once.
    pub winner_claimed: bool,
    pub end_reason: Option<EndReason>,
    pub started_at: Instant,
    pub ended_at: Option<Instant>,
    pub last_activity: Instant,
    pub paused: bool,
    pub claims: Vec<ClaimRecord>,
    /// The final store write failed and must be retried before eviction.
    pub persist_pending: bool,
}

impl Round {
    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub(crate) fn participant_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    /// Participants still holding a seat (active or within grace).
    pub fn seated(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.holds_seat())
    }

    pub fn active_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_active()).count()
    }

    /// Participants still owed their stake back, seated or not.
    pub fn refunds_due(&self) -> impl Iterator<Item = &Participant> {
        let owed = self.end_reason.is_some_and(EndReason::refunds_stakes);
        self.participants
            .iter()
            .filter(move |p| owed && !p.refunded && p.stake > 0)
    }

    pub fn refunds_pending(&self) -> bool {
        self.refunds_due().next().is_some()
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == RoundStatus::InProgress
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub fn duration_seconds(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.started_at).as_secs()
    }

    /// The record written to the store once the round is terminal.
    pub fn outcome(&self) -> Option<RoundOutcome> {
        let reason = self.end_reason?;
        Some(RoundOutcome {
            status: self.status,
            winner: self.winner,
            reason,
            drawn_count: self.drawn.len(),
            duration_seconds: self.duration_seconds(),
        })
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            round_id: self.id,
            room_id: self.room_id,
            tier: self.tier,
            status: self.status,
            drawn: self.drawn.as_slice().to_vec(),
            participants: self
                .participants
                .iter()
                .map(|p| ParticipantView {
                    id: p.id,
                    name: p.name.clone(),
                    role: p.role(),
                    board: p.board.clone(),
                    refunded: p.refunded,
                })
                .collect(),
            spectators: self.spectators.clone(),
            winner: self.winner,
            end_reason: self.end_reason,
            paused: self.paused,
        }
    }
}

/// A participant as seen from outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub name: String,
    pub role: Role,
    pub board: Board,
    pub refunded: bool,
}

/// Read-only copy of a round, safe to hand across the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round_id: RoundId,
    pub room_id: RoomId,
    pub tier: Tier,
    pub status: RoundStatus,
    pub drawn: Vec<u8>,
    pub participants: Vec<ParticipantView>,
    pub spectators: Vec<ParticipantId>,
    pub winner: Option<ParticipantId>,
    pub end_reason: Option<EndReason>,
    pub paused: bool,
}

impl RoundSnapshot {
    pub fn participant(&self, id: ParticipantId) -> Option<&ParticipantView> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.role == Role::Active)
            .count()
    }
}
