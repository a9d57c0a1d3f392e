//! Shared vocabulary for Drawhall.
//!
//! - **Types** ([`ParticipantId`], [`RoundId`], [`Tier`], [`Pattern`],
//!   [`EndReason`], …) used by every other crate.
//! - **Events** ([`Event`], [`RoomEvent`]) the engine publishes, and the
//!   [`Broadcaster`] that carries them, one topic per room.
//! - **Codec** ([`Codec`], [`JsonCodec`]) for turning events into bytes.
//!
//! ```text
//! Engine ──publish──→ Broadcaster ──subscribe_room──→ transport (out of scope)
//! ```

mod codec;
pub mod duration_ms;
mod error;
mod event;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use event::{Broadcaster, DEFAULT_EVENT_CAPACITY, Event, RoomEvent, RoomSubscription};
pub use types::{
    EndReason, LateReason, LeaveReason, ParticipantId, Pattern, Role, RoomId, RoundId,
    RoundStatus, Tier,
};
