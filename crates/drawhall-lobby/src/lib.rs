//! Matchmaking for Drawhall.
//!
//! Participants wait in per-tier rooms until there are enough of them to
//! play; the [`MatchmakingPool`] then hands each filled room to the
//! round coordinator.
//!
//! # Key types
//!
//! - [`MatchmakingPool`]: opens rooms, seats participants, runs the wait
//!   timer and countdown
//! - [`WaitingRoom`] and [`RoomSnapshot`]: one room and its read-only copy
//! - [`RoomPhase`]: gathering, waiting for more, counting down, started
//! - [`PoolConfig`]: wait and countdown lengths

mod config;
mod error;
mod pool;
mod room;

pub use config::{PoolConfig, RoomPhase};
pub use error::LobbyError;
pub use pool::MatchmakingPool;
pub use room::{RoomSnapshot, WaitingRoom};
