//! Outbound events and the per-room publish/subscribe channel.
//!
//! The engine never talks to sockets. It publishes [`Event`]s tagged with
//! the room they belong to, and whatever transport sits in front of the
//! engine subscribes to the rooms its clients care about.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::{EndReason, LateReason, LeaveReason, ParticipantId, RoomId, RoundId, Tier};

/// Default buffer for the broadcast channel. Slow subscribers that fall
/// further behind than this lose the oldest events.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Everything the engine tells clients.
///
/// Internally tagged, so `NumberDrawn { number: 7, remaining: 68 }`
/// becomes `{"type":"number_drawn","number":7,"remaining":68}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // -- Lobby --
    ParticipantJoined {
        participant_id: ParticipantId,
        participants: usize,
    },
    WaitingForPlayers {
        participants: usize,
        needed: usize,
    },
    CountdownTick {
        seconds_remaining: u32,
    },
    CountdownCancelled {
        reason: String,
    },

    // -- Round --
    RoundStarted {
        room_id: RoomId,
        round_id: RoundId,
        tier: Tier,
        participants: Vec<ParticipantId>,
        interval_ms: u64,
    },
    NumberDrawn {
        number: u8,
        remaining: usize,
    },
    DrawExhausted,
    ClaimResult {
        participant_id: ParticipantId,
        accepted: bool,
        is_winner: bool,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        late_reason: Option<LateReason>,
    },
    RoundOver {
        winner: Option<ParticipantId>,
        reason: EndReason,
        final_numbers: Vec<u8>,
        duration_seconds: u64,
    },

    // -- Presence --
    ParticipantDisconnected {
        participant_id: ParticipantId,
        deadline_secs: u64,
    },
    ParticipantReconnected {
        participant_id: ParticipantId,
    },
    ParticipantLeft {
        participant_id: ParticipantId,
        reason: LeaveReason,
    },
}

/// An event together with the room topic it was published on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub room_id: RoomId,
    #[serde(flatten)]
    pub event: Event,
}

/// Cheap-to-clone handle for publishing events. One topic per room.
///
/// Publishing never blocks and never fails: if nobody is subscribed the
/// event is simply dropped.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<RoomEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, room_id: RoomId, event: Event) {
        trace!(%room_id, ?event, "publish");
        let _ = self.tx.send(RoomEvent { room_id, event });
    }

    /// Subscribes to every room.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.tx.subscribe()
    }

    /// Subscribes to a single room's topic.
    pub fn subscribe_room(&self, room_id: RoomId) -> RoomSubscription {
        RoomSubscription {
            room_id,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Receiver filtered down to one room.
pub struct RoomSubscription {
    room_id: RoomId,
    rx: broadcast::Receiver<RoomEvent>,
}

impl RoomSubscription {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Waits for the next event on this room. `None` once the channel closes.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(ev) if ev.room_id == self.room_id => return Some(ev.event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(room_id = %self.room_id, missed, "subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next already-buffered event for this room, if any.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(ev) if ev.room_id == self.room_id => return Some(ev.event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(room_id = %self.room_id, missed, "subscriber lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// Drains every buffered event for this room.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(ev) = self.try_recv() {
            out.push(ev);
        }
        out
    }
}
