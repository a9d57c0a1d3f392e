//! A waiting room: one tier, a roster, and a phase.

use drawhall_protocol::{ParticipantId, RoomId, Tier};
use drawhall_round::Entrant;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::RoomPhase;

#[derive(Debug, Clone)]
pub struct WaitingRoom {
    pub id: RoomId,
    pub tier: Tier,
    pub min_participants: usize,
    pub max_participants: usize,
    /// In join order. Seats in the round follow this order.
    pub roster: Vec<Entrant>,
    pub phase: RoomPhase,
    pub opened_at: Instant,
}

impl WaitingRoom {
    pub(crate) fn new(id: RoomId, tier: Tier, min: usize, max: usize) -> Self {
        Self {
            id,
            tier,
            min_participants: min,
            max_participants: max,
            roster: Vec::new(),
            phase: RoomPhase::Gathering,
            opened_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.roster.len() >= self.max_participants
    }

    pub fn has_minimum(&self) -> bool {
        self.roster.len() >= self.min_participants
    }

    /// Participants still missing to reach the minimum.
    pub fn needed(&self) -> usize {
        self.min_participants.saturating_sub(self.roster.len())
    }

    pub fn contains(&self, participant_id: ParticipantId) -> bool {
        self.roster.iter().any(|e| e.id == participant_id)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id,
            tier: self.tier,
            phase: self.phase,
            participants: self.roster.iter().map(|e| e.id).collect(),
            min_participants: self.min_participants,
            max_participants: self.max_participants,
        }
    }
}

/// Read-only copy of a waiting room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub tier: Tier,
    pub phase: RoomPhase,
    pub participants: Vec<ParticipantId>,
    pub min_participants: usize,
    pub max_participants: usize,
}

impl RoomSnapshot {
    /// The round this room became, if the call that produced this
    /// snapshot started it.
    pub fn round_id(&self) -> Option<drawhall_protocol::RoundId> {
        match self.phase {
            RoomPhase::Started { round_id } => Some(round_id),
            _ => None,
        }
    }
}
