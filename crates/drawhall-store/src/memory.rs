//! In-process [`RoundStore`] with failure injection.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use drawhall_protocol::{ParticipantId, RoomId, RoundId, RoundStatus, Tier};

use crate::{AuditEntry, RoundOutcome, RoundRecord, RoundStore, StoreError, WinnerCommit};

#[derive(Debug, Default)]
struct RefundLedger {
    calls: u32,
    applied: bool,
    amount: u64,
}

#[derive(Debug, Default)]
struct Faults {
    create: bool,
    append: bool,
    fetch: bool,
    commit: bool,
    cancel: bool,
    /// Number of upcoming `finish_round` calls to fail.
    finish: u32,
    /// Per participant, number of upcoming refund calls to fail.
    refunds: HashMap<ParticipantId, u32>,
}

#[derive(Debug, Default)]
struct Inner {
    next_round: u64,
    rounds: BTreeMap<RoundId, RoundRecord>,
    refunds: HashMap<(ParticipantId, RoundId), RefundLedger>,
    cancelled_rooms: Vec<RoomId>,
    finish_calls: HashMap<RoundId, u32>,
    audit: Vec<AuditEntry>,
    faults: Faults,
}

/// A [`RoundStore`] kept in memory.
///
/// Clones share the same data, so a test can hand one clone to the engine
/// and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

fn unavailable(op: &str) -> StoreError {
    StoreError::Unavailable(format!("{op}: injected failure"))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Failure injection --

    pub async fn fail_creates(&self, fail: bool) {
        self.inner.lock().await.faults.create = fail;
    }

    pub async fn fail_appends(&self, fail: bool) {
        self.inner.lock().await.faults.append = fail;
    }

    pub async fn fail_fetches(&self, fail: bool) {
        self.inner.lock().await.faults.fetch = fail;
    }

    pub async fn fail_commits(&self, fail: bool) {
        self.inner.lock().await.faults.commit = fail;
    }

    pub async fn fail_cancels(&self, fail: bool) {
        self.inner.lock().await.faults.cancel = fail;
    }

    /// Fails the next `times` calls to `finish_round`.
    pub async fn fail_next_finishes(&self, times: u32) {
        self.inner.lock().await.faults.finish = times;
    }

    /// Fails the next `times` refund calls for this participant.
    pub async fn fail_refunds_for(&self, participant_id: ParticipantId, times: u32) {
        self.inner
            .lock()
            .await
            .faults
            .refunds
            .insert(participant_id, times);
    }

    /// Writes a winner as if another engine process had committed it.
    pub async fn commit_foreign_winner(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .rounds
            .get_mut(&round_id)
            .ok_or(StoreError::RoundNotFound(round_id))?;
        record.winner = Some(participant_id);
        Ok(())
    }

    // -- Inspection --

    pub async fn round(&self, round_id: RoundId) -> Option<RoundRecord> {
        self.inner.lock().await.rounds.get(&round_id).cloned()
    }

    pub async fn round_count(&self) -> usize {
        self.inner.lock().await.rounds.len()
    }

    /// Refund calls received for `(participant, round)`, failed ones included.
    pub async fn refund_calls(&self, participant_id: ParticipantId, round_id: RoundId) -> u32 {
        self.inner
            .lock()
            .await
            .refunds
            .get(&(participant_id, round_id))
            .map_or(0, |l| l.calls)
    }

    /// Amount actually credited for `(participant, round)`.
    pub async fn refunded_amount(&self, participant_id: ParticipantId, round_id: RoundId) -> u64 {
        self.inner
            .lock()
            .await
            .refunds
            .get(&(participant_id, round_id))
            .filter(|l| l.applied)
            .map_or(0, |l| l.amount)
    }

    pub async fn refunds_applied(&self) -> usize {
        self.inner
            .lock()
            .await
            .refunds
            .values()
            .filter(|l| l.applied)
            .count()
    }

    pub async fn cancelled_rooms(&self) -> Vec<RoomId> {
        self.inner.lock().await.cancelled_rooms.clone()
    }

    pub async fn finish_calls(&self, round_id: RoundId) -> u32 {
        self.inner
            .lock()
            .await
            .finish_calls
            .get(&round_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn audit_log(&self) -> Vec<AuditEntry> {
        self.inner.lock().await.audit.clone()
    }
}

#[async_trait]
impl RoundStore for MemoryStore {
    async fn create_round(
        &self,
        room_id: RoomId,
        tier: Tier,
        participants: &[ParticipantId],
    ) -> Result<RoundId, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.faults.create {
            return Err(unavailable("create_round"));
        }
        inner.next_round += 1;
        let round_id = RoundId(inner.next_round);
        inner.rounds.insert(
            round_id,
            RoundRecord {
                round_id,
                room_id,
                tier,
                participants: participants.to_vec(),
                drawn: Vec::new(),
                status: RoundStatus::InProgress,
                winner: None,
                end_reason: None,
                duration_seconds: None,
            },
        );
        debug!(%round_id, %room_id, "store: round created");
        Ok(round_id)
    }

    async fn append_drawn_number(&self, round_id: RoundId, number: u8) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.faults.append {
            return Err(unavailable("append_drawn_number"));
        }
        let record = inner
            .rounds
            .get_mut(&round_id)
            .ok_or(StoreError::RoundNotFound(round_id))?;
        if record.drawn.contains(&number) {
            return Err(StoreError::Rejected(format!(
                "number {number} already drawn in {round_id}"
            )));
        }
        record.drawn.push(number);
        Ok(())
    }

    async fn commit_winner_if_absent(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<WinnerCommit, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.faults.commit {
            return Err(unavailable("commit_winner_if_absent"));
        }
        let record = inner
            .rounds
            .get_mut(&round_id)
            .ok_or(StoreError::RoundNotFound(round_id))?;
        match record.winner {
            Some(winner) => Ok(WinnerCommit {
                committed: false,
                winner,
            }),
            None => {
                record.winner = Some(participant_id);
                Ok(WinnerCommit {
                    committed: true,
                    winner: participant_id,
                })
            }
        }
    }

    async fn refund_stake(
        &self,
        participant_id: ParticipantId,
        round_id: RoundId,
        amount: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let ledger = inner.refunds.entry((participant_id, round_id)).or_default();
        ledger.calls += 1;

        if let Some(remaining) = inner.faults.refunds.get_mut(&participant_id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(unavailable("refund_stake"));
            }
        }

        let ledger = inner.refunds.entry((participant_id, round_id)).or_default();
        if !ledger.applied {
            ledger.applied = true;
            ledger.amount = amount;
        }
        Ok(())
    }

    async fn fetch_round(&self, round_id: RoundId) -> Result<RoundRecord, StoreError> {
        let inner = self.inner.lock().await;
        if inner.faults.fetch {
            return Err(unavailable("fetch_round"));
        }
        inner
            .rounds
            .get(&round_id)
            .cloned()
            .ok_or(StoreError::RoundNotFound(round_id))
    }

    async fn mark_room_cancelled(&self, room_id: RoomId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.faults.cancel {
            return Err(unavailable("mark_room_cancelled"));
        }
        if !inner.cancelled_rooms.contains(&room_id) {
            inner.cancelled_rooms.push(room_id);
        }
        Ok(())
    }

    async fn finish_round(
        &self,
        round_id: RoundId,
        outcome: &RoundOutcome,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        *inner.finish_calls.entry(round_id).or_default() += 1;
        if inner.faults.finish > 0 {
            inner.faults.finish -= 1;
            return Err(unavailable("finish_round"));
        }
        let record = inner
            .rounds
            .get_mut(&round_id)
            .ok_or(StoreError::RoundNotFound(round_id))?;
        record.status = outcome.status;
        record.end_reason = Some(outcome.reason);
        record.duration_seconds = Some(outcome.duration_seconds);
        if record.winner.is_none() {
            record.winner = outcome.winner;
        }
        Ok(())
    }

    async fn record_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.inner.lock().await.audit.push(entry);
        Ok(())
    }
}
