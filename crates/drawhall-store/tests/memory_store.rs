//! Tests for the in-memory store's atomic and idempotent operations.

use drawhall_protocol::{EndReason, ParticipantId, RoomId, RoundStatus, Tier};
use drawhall_store::{
    AuditAction, AuditEntry, MemoryStore, RoundOutcome, RoundStore, StoreError,
};

const ALICE: ParticipantId = ParticipantId(1);
const BOB: ParticipantId = ParticipantId(2);

async fn store_with_round() -> (MemoryStore, drawhall_protocol::RoundId) {
    let store = MemoryStore::new();
    let round = store
        .create_round(RoomId(1), Tier::Easy, &[ALICE, BOB])
        .await
        .unwrap();
    (store, round)
}

#[tokio::test]
async fn test_create_round_assigns_sequential_ids() {
    let store = MemoryStore::new();
    let a = store.create_round(RoomId(1), Tier::Easy, &[ALICE]).await.unwrap();
    let b = store.create_round(RoomId(2), Tier::Hard, &[BOB]).await.unwrap();
    assert_ne!(a, b);
    assert_eq!(store.round_count().await, 2);

    let record = store.fetch_round(b).await.unwrap();
    assert_eq!(record.tier, Tier::Hard);
    assert_eq!(record.status, RoundStatus::InProgress);
    assert_eq!(record.winner, None);
}

#[tokio::test]
async fn test_create_round_injected_failure_is_unavailable() {
    let store = MemoryStore::new();
    store.fail_creates(true).await;
    let err = store.create_round(RoomId(1), Tier::Easy, &[ALICE]).await;
    assert!(matches!(err, Err(StoreError::Unavailable(_))));
    assert_eq!(store.round_count().await, 0);
}

#[tokio::test]
async fn test_append_drawn_number_rejects_duplicates() {
    let (store, round) = store_with_round().await;
    store.append_drawn_number(round, 7).await.unwrap();
    let err = store.append_drawn_number(round, 7).await;
    assert!(matches!(err, Err(StoreError::Rejected(_))));
    assert_eq!(store.fetch_round(round).await.unwrap().drawn, vec![7]);
}

#[tokio::test]
async fn test_commit_winner_if_absent_only_first_commits() {
    let (store, round) = store_with_round().await;

    let first = store.commit_winner_if_absent(round, ALICE).await.unwrap();
    assert!(first.committed);
    assert_eq!(first.winner, ALICE);

    let second = store.commit_winner_if_absent(round, BOB).await.unwrap();
    assert!(!second.committed);
    assert_eq!(second.winner, ALICE);
}

#[tokio::test]
async fn test_commit_winner_unknown_round_is_not_found() {
    let store = MemoryStore::new();
    let err = store
        .commit_winner_if_absent(drawhall_protocol::RoundId(99), ALICE)
        .await;
    assert!(matches!(err, Err(StoreError::RoundNotFound(_))));
}

#[tokio::test]
async fn test_refund_stake_is_idempotent_per_participant_and_round() {
    let (store, round) = store_with_round().await;
    store.refund_stake(ALICE, round, 10).await.unwrap();
    store.refund_stake(ALICE, round, 10).await.unwrap();

    assert_eq!(store.refund_calls(ALICE, round).await, 2);
    assert_eq!(store.refunded_amount(ALICE, round).await, 10);
    assert_eq!(store.refunds_applied().await, 1);
}

#[tokio::test]
async fn test_refund_stake_injected_failure_then_success() {
    let (store, round) = store_with_round().await;
    store.fail_refunds_for(BOB, 1).await;

    assert!(store.refund_stake(BOB, round, 5).await.is_err());
    assert_eq!(store.refunded_amount(BOB, round).await, 0);

    store.refund_stake(BOB, round, 5).await.unwrap();
    assert_eq!(store.refunded_amount(BOB, round).await, 5);
    assert_eq!(store.refund_calls(BOB, round).await, 2);
}

#[tokio::test]
async fn test_finish_round_writes_outcome_and_keeps_committed_winner() {
    let (store, round) = store_with_round().await;
    store.commit_winner_if_absent(round, BOB).await.unwrap();

    let outcome = RoundOutcome {
        status: RoundStatus::Finished,
        winner: Some(BOB),
        reason: EndReason::Winner,
        drawn_count: 12,
        duration_seconds: 48,
    };
    store.finish_round(round, &outcome).await.unwrap();

    let record = store.fetch_round(round).await.unwrap();
    assert_eq!(record.status, RoundStatus::Finished);
    assert_eq!(record.winner, Some(BOB));
    assert_eq!(record.end_reason, Some(EndReason::Winner));
    assert_eq!(record.duration_seconds, Some(48));
}

#[tokio::test]
async fn test_finish_round_fails_configured_number_of_times() {
    let (store, round) = store_with_round().await;
    store.fail_next_finishes(1).await;
    let outcome = RoundOutcome {
        status: RoundStatus::Abandoned,
        winner: None,
        reason: EndReason::IdleTimeout,
        drawn_count: 0,
        duration_seconds: 120,
    };
    assert!(store.finish_round(round, &outcome).await.is_err());
    assert!(store.finish_round(round, &outcome).await.is_ok());
    assert_eq!(store.finish_calls(round).await, 2);
}

#[tokio::test]
async fn test_mark_room_cancelled_and_audit_log() {
    let store = MemoryStore::new();
    store.mark_room_cancelled(RoomId(3)).await.unwrap();
    store.mark_room_cancelled(RoomId(3)).await.unwrap();
    assert_eq!(store.cancelled_rooms().await, vec![RoomId(3)]);

    store
        .record_audit(AuditEntry::new(AuditAction::RoomCancelled, "idle").room(RoomId(3)))
        .await
        .unwrap();
    let log = store.audit_log().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].room_id, Some(RoomId(3)));
}
