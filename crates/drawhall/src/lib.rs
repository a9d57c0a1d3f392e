//! # Drawhall
//!
//! Real-time round coordination for number-drawing games.
//!
//! Participants gather in waiting rooms, rooms turn into rounds, and a
//! single master clock draws numbers for every round at once. Competing
//! win claims resolve to exactly one winner, disconnected participants
//! keep their seat for a grace window, and idle rounds are ended with
//! every stake refunded exactly once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use drawhall::prelude::*;
//!
//! # async fn demo() -> Result<(), DrawhallError> {
//! let (engine, handle) = Engine::new(EngineConfig::default(), Arc::new(MemoryStore::new()));
//! engine.spawn();
//!
//! let room = handle.find_or_open_room(Tier::Easy).await?;
//! let mut events = handle.subscribe_room(room.room_id);
//! handle.join(room.room_id, Entrant::new(ParticipantId(1), "ada")).await?;
//! handle.join(room.room_id, Entrant::new(ParticipantId(2), "bob")).await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod error;
pub mod telemetry;

pub use config::{ConfigError, EngineConfig, LoopConfig};
pub use engine::{Engine, EngineHandle, EngineStats, ShutdownReport};
pub use error::DrawhallError;

pub use drawhall_lobby as lobby;
pub use drawhall_monitor as monitor;
pub use drawhall_protocol as protocol;
pub use drawhall_round as round;
pub use drawhall_store as store;
pub use drawhall_tick as tick;

/// The types most embedders need.
pub mod prelude {
    pub use crate::{DrawhallError, Engine, EngineConfig, EngineHandle, ShutdownReport};
    pub use drawhall_lobby::{RoomPhase, RoomSnapshot};
    pub use drawhall_protocol::{
        EndReason, Event, LateReason, ParticipantId, Pattern, RoomId, RoundId, Tier,
    };
    pub use drawhall_round::{Board, Claim, ClaimVerdict, Entrant, RoundSnapshot};
    pub use drawhall_store::{MemoryStore, RoundStore};
}
