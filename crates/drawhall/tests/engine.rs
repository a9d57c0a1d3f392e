//! End-to-end tests: a spawned engine driven only through its handle.
//!
//! The runtime starts paused, so the master clock advances instantly
//! whenever every task is idle.

use std::sync::Arc;
use std::time::Duration;

use drawhall::prelude::*;
use drawhall::protocol::RoomSubscription;
use drawhall::round::FREE;

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: u64) -> ParticipantId {
    ParticipantId(id)
}

fn entrant(id: u64) -> Entrant {
    Entrant::new(pid(id), format!("player-{id}"))
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.tiers.easy.draw_interval = Duration::from_secs(1);
    config.pool.wait_for_players = Duration::from_secs(1);
    config.pool.countdown_secs = 2;
    config.round.rng_seed = Some(42);
    config
}

fn spawn(config: EngineConfig) -> (EngineHandle, MemoryStore, tokio::task::JoinHandle<()>) {
    let store = MemoryStore::new();
    let (engine, handle) = Engine::new(config, Arc::new(store.clone()));
    let task = engine.spawn();
    (handle, store, task)
}

/// Waits for the first event matching `pred`, giving up after ten
/// simulated minutes.
async fn next_matching(
    sub: &mut RoomSubscription,
    mut pred: impl FnMut(&Event) -> bool,
) -> Event {
    let wait = async {
        loop {
            let event = sub.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(600), wait)
        .await
        .expect("timed out waiting for event")
}

/// Opens a room, seats `players` and waits for the round to start.
async fn started_round(
    handle: &EngineHandle,
    players: u64,
) -> (RoomSubscription, RoundId) {
    let room = handle.find_or_open_room(Tier::Easy).await.unwrap();
    let mut sub = handle.subscribe_room(room.room_id);
    for id in 1..=players {
        handle.join(room.room_id, entrant(id)).await.unwrap();
    }
    let started = next_matching(&mut sub, |e| matches!(e, Event::RoundStarted { .. })).await;
    let Event::RoundStarted { round_id, .. } = started else {
        unreachable!()
    };
    (sub, round_id)
}

/// The first participant holding a fully drawn row, if any.
fn row_winner(snapshot: &RoundSnapshot) -> Option<ParticipantId> {
    snapshot.participants.iter().find_map(|p| {
        p.board
            .lines(Pattern::Row)
            .iter()
            .any(|line| {
                line.iter()
                    .all(|n| *n == FREE || snapshot.drawn.contains(n))
            })
            .then_some(p.id)
    })
}

// =========================================================================
// Matchmaking through the handle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_join_two_players_countdown_then_round_starts() {
    let (handle, _store, _task) = spawn(config());
    let room = handle.find_or_open_room(Tier::Easy).await.unwrap();
    let mut sub = handle.subscribe_room(room.room_id);

    handle.join(room.room_id, entrant(1)).await.unwrap();
    let snap = handle.join(room.room_id, entrant(2)).await.unwrap();
    assert_eq!(snap.participants.len(), 2);

    let ticks: Vec<u32> = {
        let mut seen = Vec::new();
        loop {
            match next_matching(&mut sub, |_| true).await {
                Event::CountdownTick { seconds_remaining } => seen.push(seconds_remaining),
                Event::RoundStarted { participants, .. } => {
                    assert_eq!(participants, vec![pid(1), pid(2)]);
                    break seen;
                }
                _ => {}
            }
        }
    };
    assert_eq!(ticks, vec![2, 1]);

    let room_after = handle.room_snapshot(room.room_id).await.unwrap();
    assert!(room_after.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_quick_join_twice_returns_already_queued() {
    let (handle, _store, _task) = spawn(config());
    handle.quick_join(Tier::Medium, entrant(1)).await.unwrap();

    let err = handle.quick_join(Tier::Medium, entrant(1)).await.unwrap_err();
    assert!(matches!(
        err,
        DrawhallError::Lobby(drawhall::lobby::LobbyError::AlreadyQueued(_, _))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_leave_below_minimum_publishes_waiting_for_players() {
    let (handle, _store, _task) = spawn(config());
    let room = handle.find_or_open_room(Tier::Easy).await.unwrap();
    let mut sub = handle.subscribe_room(room.room_id);
    handle.join(room.room_id, entrant(1)).await.unwrap();
    handle.join(room.room_id, entrant(2)).await.unwrap();
    sub.drain();

    let snap = handle.leave(room.room_id, pid(2)).await.unwrap().unwrap();

    assert_eq!(snap.phase, RoomPhase::Gathering);
    let waiting = next_matching(&mut sub, |e| matches!(e, Event::WaitingForPlayers { .. })).await;
    assert_eq!(
        waiting,
        Event::WaitingForPlayers {
            participants: 1,
            needed: 1
        }
    );
}

// =========================================================================
// Rounds through the handle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_submit_claim_first_complete_row_wins_once() {
    let (handle, store, _task) = spawn(config());
    let (mut sub, round_id) = started_round(&handle, 2).await;

    let winner = loop {
        let event = next_matching(&mut sub, |e| {
            matches!(e, Event::NumberDrawn { .. } | Event::RoundOver { .. })
        })
        .await;
        assert!(
            matches!(event, Event::NumberDrawn { .. }),
            "round ended before anyone could claim: {event:?}"
        );
        let snapshot = handle.round_snapshot(round_id).await.unwrap().unwrap();
        if let Some(winner) = row_winner(&snapshot) {
            break winner;
        }
    };

    let verdict = handle
        .submit_claim(round_id, Claim::new(winner, Pattern::Row))
        .await
        .unwrap();
    assert_eq!(verdict, ClaimVerdict::Winner);

    let over = next_matching(&mut sub, |e| matches!(e, Event::RoundOver { .. })).await;
    let Event::RoundOver { winner: announced, reason, .. } = over else {
        unreachable!()
    };
    assert_eq!(announced, Some(winner));
    assert_eq!(reason, EndReason::Winner);

    let other = if winner == pid(1) { pid(2) } else { pid(1) };
    let late = handle
        .submit_claim(round_id, Claim::new(other, Pattern::Row))
        .await
        .unwrap();
    assert_eq!(late, ClaimVerdict::Late(LateReason::AlreadyDecided));

    let record = store.round(round_id).await.unwrap();
    assert_eq!(record.winner, Some(winner));
    assert_eq!(store.refunds_applied().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_returns_same_board() {
    let (handle, _store, _task) = spawn(config());
    let (mut sub, round_id) = started_round(&handle, 3).await;
    let before = handle.round_snapshot(round_id).await.unwrap().unwrap();
    let board = before.participant(pid(2)).unwrap().board.clone();

    handle.disconnect(round_id, pid(2)).await.unwrap();
    next_matching(&mut sub, |e| matches!(e, Event::ParticipantDisconnected { .. })).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    let restored = handle.reconnect(round_id, pid(2)).await.unwrap();
    assert_eq!(restored, board);
    let after = handle.round_snapshot(round_id).await.unwrap().unwrap();
    assert_eq!(after.active_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_past_grace_removes_participant() {
    let (handle, _store, _task) = spawn(config());
    let (mut sub, round_id) = started_round(&handle, 3).await;

    handle.disconnect(round_id, pid(3)).await.unwrap();
    let left = next_matching(&mut sub, |e| matches!(e, Event::ParticipantLeft { .. })).await;
    assert!(matches!(left, Event::ParticipantLeft { participant_id, .. } if participant_id == pid(3)));

    let err = handle.reconnect(round_id, pid(3)).await.unwrap_err();
    assert!(matches!(err, DrawhallError::Round(_)));
}

#[tokio::test(start_paused = true)]
async fn test_leave_round_last_player_standing_wins() {
    let (handle, _store, _task) = spawn(config());
    let (mut sub, round_id) = started_round(&handle, 2).await;

    handle.leave_round(round_id, pid(1)).await.unwrap();

    let over = next_matching(&mut sub, |e| matches!(e, Event::RoundOver { .. })).await;
    assert!(matches!(
        over,
        Event::RoundOver { winner: Some(w), reason: EndReason::LastPlayerStanding, .. } if w == pid(2)
    ));
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_paused_round_times_out_and_refunds_once() {
    let mut config = config();
    config.monitor.scan_interval = Duration::from_secs(1);
    config.monitor.idle_timeout = Duration::from_secs(3);
    let (handle, store, _task) = spawn(config);
    let (mut sub, round_id) = started_round(&handle, 2).await;

    handle.pause_round(round_id).await.unwrap();
    let over = next_matching(&mut sub, |e| matches!(e, Event::RoundOver { .. })).await;
    assert!(matches!(
        over,
        Event::RoundOver { reason: EndReason::IdleTimeout, winner: None, .. }
    ));

    // Commands are served between ticks, so the scan has finished here.
    handle.stats().await.unwrap();
    assert_eq!(store.refunds_applied().await, 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.stats().await.unwrap();
    assert_eq!(store.refund_calls(pid(1), round_id).await, 1);
    assert_eq!(store.refund_calls(pid(2), round_id).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_clock_holds_draws_until_resumed() {
    let (handle, _store, _task) = spawn(config());
    let (mut sub, round_id) = started_round(&handle, 2).await;

    handle.pause_clock().await.unwrap();
    let drawn = handle.round_snapshot(round_id).await.unwrap().unwrap().drawn.len();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let held = handle.round_snapshot(round_id).await.unwrap().unwrap();
    assert_eq!(held.drawn.len(), drawn);
    assert!(handle.stats().await.unwrap().clock_paused);

    sub.drain();
    handle.resume_clock().await.unwrap();
    next_matching(&mut sub, |e| matches!(e, Event::NumberDrawn { .. })).await;
    assert!(!handle.stats().await.unwrap().clock_paused);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_refunds_live_rounds_and_stops() {
    let (handle, store, task) = spawn(config());
    let (_sub, round_id) = started_round(&handle, 2).await;
    handle.quick_join(Tier::Hard, entrant(9)).await.unwrap();

    let report = handle.shutdown().await.unwrap();

    assert_eq!(report.rounds_ended, 1);
    assert_eq!(report.rooms_closed, 1);
    assert_eq!(report.refunds_issued, 2);
    assert_eq!(store.refunded_amount(pid(1), round_id).await, 10);
    task.await.unwrap();

    let err = handle.round_snapshot(round_id).await.unwrap_err();
    assert!(matches!(err, DrawhallError::EngineStopped));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_every_handle_stops_engine() {
    let (handle, _store, task) = spawn(config());
    handle.find_or_open_room(Tier::Easy).await.unwrap();

    drop(handle);

    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stats_counts_rooms_rounds_and_timers() {
    let (handle, _store, _task) = spawn(config());
    let (_sub, _round_id) = started_round(&handle, 2).await;
    handle.quick_join(Tier::Hard, entrant(9)).await.unwrap();

    let stats = handle.stats().await.unwrap();

    assert_eq!(stats.live_rounds, 1);
    assert_eq!(stats.waiting_rooms, 1);
    assert_eq!(stats.queued_participants, 1);
    assert_eq!(stats.timers, 1);
    assert!(stats.ticks > 0);
}
