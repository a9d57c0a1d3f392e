//! Keys for the shared timer table.

use drawhall_protocol::{ParticipantId, RoomId, RoundId};
use drawhall_tick::TimerScheduler;

/// Every logical timer the engine registers.
///
/// Round keys belong to the [`RoundCoordinator`](crate::RoundCoordinator);
/// room keys belong to the matchmaking pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerKey {
    /// Draw cadence, repeating.
    Draw(RoundId),
    /// Reconnect grace deadline, one-shot.
    Reconnect(RoundId, ParticipantId),
    /// Post-end eviction, one-shot.
    Evict(RoundId),
    /// Wait-for-more-players, one-shot.
    Wait(RoomId),
    /// One-second countdown step, repeating.
    Countdown(RoomId),
}

impl TimerKey {
    /// The round this key belongs to, if it is a round timer.
    pub fn round_id(&self) -> Option<RoundId> {
        match *self {
            Self::Draw(id) | Self::Reconnect(id, _) | Self::Evict(id) => Some(id),
            Self::Wait(_) | Self::Countdown(_) => None,
        }
    }

    pub fn room_id(&self) -> Option<RoomId> {
        match *self {
            Self::Wait(id) | Self::Countdown(id) => Some(id),
            _ => None,
        }
    }
}

/// The timer table as the engine instantiates it.
pub type Timers = TimerScheduler<TimerKey>;
