//! Round coordination for Drawhall.
//!
//! A round is one play-through: numbers are drawn on a fixed cadence until
//! someone claims a winning line, everyone leaves, or the numbers run out.
//!
//! # Key types
//!
//! - [`RoundCoordinator`]: owns every live [`Round`], adjudicates claims,
//!   handles disconnects and ends rounds
//! - [`Board`] and [`DrawnSet`]: the 5×5 grid and the numbers revealed so far
//! - [`Claim`] and [`ClaimVerdict`]: what a participant asserts and what
//!   they hear back
//! - [`compute_plan`]: the difficulty planner, a pure function over a round
//! - [`TimerKey`]: names every timer in the shared [`Timers`] table
//! - [`TierTable`] and [`RoundConfig`]: settings

mod board;
mod claim;
mod config;
mod coordinator;
mod error;
mod planner;
mod round;
mod timers;

pub use board::{Board, DrawnSet, FREE, UNIVERSE};
pub use claim::{Claim, ClaimRecord, ClaimRejection, ClaimVerdict};
pub use config::{RoundConfig, TierConfig, TierTable};
pub use coordinator::RoundCoordinator;
pub use error::RoundError;
pub use planner::{Plan, compute_plan};
pub use round::{Entrant, Participant, ParticipantView, Presence, Round, RoundSnapshot};
pub use timers::{TimerKey, Timers};
