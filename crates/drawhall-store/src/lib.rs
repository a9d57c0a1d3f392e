//! The persisted-store port.
//!
//! In-memory round state is authoritative only inside one process. The
//! store is what several engine processes share, so it is the arbiter for
//! anything that must happen exactly once: committing a winner and
//! refunding a stake.
//!
//! [`RoundStore`] is the seam. Production deployments implement it over
//! their database; [`MemoryStore`] is the in-process implementation used by
//! tests and the demo, with switches for injecting failures.

mod error;
mod memory;
mod record;

use async_trait::async_trait;

use drawhall_protocol::{ParticipantId, RoomId, RoundId, Tier};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use record::{AuditAction, AuditEntry, RoundOutcome, RoundRecord, WinnerCommit};

/// Operations the engine needs from durable storage.
///
/// Every method may suspend. Implementations must make
/// [`commit_winner_if_absent`](Self::commit_winner_if_absent) an atomic
/// compare-and-set and [`refund_stake`](Self::refund_stake) idempotent per
/// `(participant, round)`.
#[async_trait]
pub trait RoundStore: Send + Sync + 'static {
    /// Writes the opening record and returns the new round's id.
    async fn create_round(
        &self,
        room_id: RoomId,
        tier: Tier,
        participants: &[ParticipantId],
    ) -> Result<RoundId, StoreError>;

    async fn append_drawn_number(&self, round_id: RoundId, number: u8) -> Result<(), StoreError>;

    /// Sets the winner only if none is set yet.
    async fn commit_winner_if_absent(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<WinnerCommit, StoreError>;

    /// Returns a participant's stake. Calling it twice for the same
    /// `(participant, round)` refunds once.
    async fn refund_stake(
        &self,
        participant_id: ParticipantId,
        round_id: RoundId,
        amount: u64,
    ) -> Result<(), StoreError>;

    async fn fetch_round(&self, round_id: RoundId) -> Result<RoundRecord, StoreError>;

    async fn mark_room_cancelled(&self, room_id: RoomId) -> Result<(), StoreError>;

    /// Writes final status, winner and duration.
    async fn finish_round(&self, round_id: RoundId, outcome: &RoundOutcome)
    -> Result<(), StoreError>;

    async fn record_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;
}
