//! Integration tests for the matchmaking pool.
//!
//! The pool, a round coordinator over a `MemoryStore`, and one timer table
//! are wired together the way the engine wires them. Time is paused and
//! moved by hand.

use std::sync::Arc;
use std::time::Duration;

use drawhall_lobby::{LobbyError, MatchmakingPool, PoolConfig, RoomPhase};
use drawhall_protocol::{Broadcaster, Event, ParticipantId, RoomId, RoundId, RoundStatus, Tier};
use drawhall_round::{
    Entrant, RoundConfig, RoundCoordinator, RoundError, TierTable, TimerKey, Timers,
};
use drawhall_store::MemoryStore;
use drawhall_tick::TimerConfig;
use tokio::time::Instant;

// =========================================================================
// Harness
// =========================================================================

struct Harness {
    pool: MatchmakingPool,
    rounds: RoundCoordinator<MemoryStore>,
    timers: Timers,
    events: Broadcaster,
    store: MemoryStore,
}

fn harness_with(tiers: TierTable, pool: PoolConfig, ceiling: usize) -> Harness {
    let store = MemoryStore::new();
    let events = Broadcaster::default();
    let rounds = RoundCoordinator::new(
        RoundConfig {
            rng_seed: Some(7),
            ..RoundConfig::default()
        },
        Arc::new(store.clone()),
        events.clone(),
    );
    Harness {
        pool: MatchmakingPool::new(pool, tiers, events.clone()),
        rounds,
        timers: Timers::new(TimerConfig {
            max_registrations: ceiling,
            ..TimerConfig::default()
        }),
        events,
        store,
    }
}

fn harness() -> Harness {
    harness_with(TierTable::default(), PoolConfig::default(), 64)
}

fn entrant(id: u64) -> Entrant {
    Entrant::new(ParticipantId(id), format!("player-{id}"))
}

impl Harness {
    async fn join(&mut self, room_id: RoomId, id: u64) -> Result<drawhall_lobby::RoomSnapshot, LobbyError> {
        self.pool
            .join(&mut self.timers, &mut self.rounds, room_id, entrant(id))
            .await
    }

    /// Advances time, dispatches due timers, and returns rounds started.
    async fn advance(&mut self, by: Duration) -> Vec<RoundId> {
        tokio::time::advance(by).await;
        let mut started = Vec::new();
        for key in self.timers.tick(Instant::now()) {
            if key.room_id().is_some() {
                if let Some(round_id) = self
                    .pool
                    .on_timer(&mut self.timers, &mut self.rounds, key)
                    .await
                {
                    started.push(round_id);
                }
            } else {
                self.rounds.on_timer(&mut self.timers, key).await.unwrap();
            }
        }
        started
    }

    fn phase(&self, room_id: RoomId) -> RoomPhase {
        self.pool.room(room_id).unwrap().phase
    }
}

fn countdown(seconds_remaining: u32) -> RoomPhase {
    RoomPhase::CountingDown { seconds_remaining }
}

// =========================================================================
// Rooms
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_find_or_open_room_reuses_open_room_for_tier() {
    let mut h = harness();
    let first = h.pool.find_or_open_room(Tier::Easy);
    let again = h.pool.find_or_open_room(Tier::Easy);
    let other = h.pool.find_or_open_room(Tier::Hard);

    assert_eq!(first.room_id, again.room_id);
    assert_ne!(first.room_id, other.room_id);
    assert_eq!(first.min_participants, 2);
    assert_eq!(first.max_participants, 8);
    assert_eq!(h.pool.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_join_below_minimum_publishes_waiting_for_players() {
    let mut h = harness();
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    let mut sub = h.events.subscribe_room(room);

    let snapshot = h.join(room, 1).await.unwrap();

    assert_eq!(snapshot.phase, RoomPhase::Gathering);
    assert_eq!(snapshot.participants, vec![ParticipantId(1)]);
    assert_eq!(
        sub.drain(),
        vec![
            Event::ParticipantJoined {
                participant_id: ParticipantId(1),
                participants: 1,
            },
            Event::WaitingForPlayers {
                participants: 1,
                needed: 1,
            },
        ]
    );
    assert!(!h.timers.is_registered(&TimerKey::Wait(room)));
}

#[tokio::test(start_paused = true)]
async fn test_join_reaching_minimum_arms_wait_timer() {
    let mut h = harness();
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(room, 1).await.unwrap();
    let snapshot = h.join(room, 2).await.unwrap();

    assert_eq!(snapshot.phase, RoomPhase::WaitingForMore);
    assert_eq!(snapshot.phase.status(), RoundStatus::Waiting);
    assert!(h.timers.is_registered(&TimerKey::Wait(room)));
}

#[tokio::test(start_paused = true)]
async fn test_join_twice_is_already_queued() {
    let mut h = harness();
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(room, 1).await.unwrap();

    let err = h.join(room, 1).await.unwrap_err();
    assert!(matches!(err, LobbyError::AlreadyQueued(p, r) if p == ParticipantId(1) && r == room));

    let err = h
        .pool
        .quick_join(&mut h.timers, &mut h.rounds, Tier::Hard, entrant(1))
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::AlreadyQueued(..)));
    assert_eq!(h.pool.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_join_unknown_room_is_not_found() {
    let mut h = harness();
    let err = h.join(RoomId(404), 1).await.unwrap_err();
    assert!(matches!(err, LobbyError::RoomNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_join_at_timer_ceiling_is_resource_exhausted() {
    let mut h = harness_with(TierTable::default(), PoolConfig::default(), 1);
    let easy = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(easy, 1).await.unwrap();
    h.join(easy, 2).await.unwrap();
    assert_eq!(h.timers.len(), 1);

    let medium = h.pool.find_or_open_room(Tier::Medium).room_id;
    h.join(medium, 3).await.unwrap();
    let err = h.join(medium, 4).await.unwrap_err();

    assert!(matches!(err, LobbyError::ResourceExhausted));
    assert_eq!(h.pool.room(medium).unwrap().len(), 1);
    assert_eq!(h.pool.room_of(ParticipantId(4)), None);
}

#[tokio::test(start_paused = true)]
async fn test_quick_join_seats_in_same_room() {
    let mut h = harness();
    let a = h
        .pool
        .quick_join(&mut h.timers, &mut h.rounds, Tier::Medium, entrant(1))
        .await
        .unwrap();
    let b = h
        .pool
        .quick_join(&mut h.timers, &mut h.rounds, Tier::Medium, entrant(2))
        .await
        .unwrap();

    assert_eq!(a.room_id, b.room_id);
    assert_eq!(b.participants.len(), 2);
    assert_eq!(h.pool.queued_count(), 2);
}

// =========================================================================
// Countdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_countdown_third_join_does_not_cancel_and_round_starts() {
    let mut h = harness();
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    let mut sub = h.events.subscribe_room(room);
    h.join(room, 1).await.unwrap();
    h.join(room, 2).await.unwrap();

    // Nothing happens before the wait elapses.
    assert!(h.advance(Duration::from_secs(9)).await.is_empty());
    assert_eq!(h.phase(room), RoomPhase::WaitingForMore);

    assert!(h.advance(Duration::from_secs(1)).await.is_empty());
    assert_eq!(h.phase(room), countdown(5));

    h.advance(Duration::from_secs(1)).await;
    assert_eq!(h.phase(room), countdown(4));

    let snapshot = h.join(room, 3).await.unwrap();
    assert_eq!(snapshot.phase, countdown(4));

    for remaining in [3, 2, 1] {
        assert!(h.advance(Duration::from_secs(1)).await.is_empty());
        assert_eq!(h.phase(room), countdown(remaining));
    }
    let started = h.advance(Duration::from_secs(1)).await;

    assert_eq!(started.len(), 1);
    assert!(h.pool.is_empty());
    assert_eq!(h.pool.queued_count(), 0);
    assert!(!h.timers.is_registered(&TimerKey::Countdown(room)));

    let round = h.rounds.snapshot(started[0]).unwrap();
    assert_eq!(round.room_id, room);
    assert_eq!(round.status, RoundStatus::InProgress);
    assert_eq!(
        round.participants.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![ParticipantId(1), ParticipantId(2), ParticipantId(3)]
    );

    let events = sub.drain();
    let ticks: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            Event::CountdownTick { seconds_remaining } => Some(*seconds_remaining),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![5, 4, 3, 2, 1]);
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, Event::CountdownCancelled { .. }))
    );
    assert!(matches!(events.last(), Some(Event::RoundStarted { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_leave_below_minimum_cancels_countdown() {
    let mut h = harness();
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(room, 1).await.unwrap();
    h.join(room, 2).await.unwrap();
    h.advance(Duration::from_secs(10)).await;
    assert_eq!(h.phase(room), countdown(5));

    let mut sub = h.events.subscribe_room(room);
    let snapshot = h
        .pool
        .leave(&mut h.timers, room, ParticipantId(2))
        .unwrap()
        .unwrap();

    assert_eq!(snapshot.phase, RoomPhase::Gathering);
    assert!(!h.timers.is_registered(&TimerKey::Countdown(room)));
    assert!(!h.timers.is_registered(&TimerKey::Wait(room)));
    let events = sub.drain();
    assert!(events.contains(&Event::CountdownCancelled {
        reason: "below_minimum".to_string(),
    }));
    assert!(events.contains(&Event::WaitingForPlayers {
        participants: 1,
        needed: 1,
    }));

    // The cancelled countdown never fires.
    assert!(h.advance(Duration::from_secs(30)).await.is_empty());
    assert_eq!(h.phase(room), RoomPhase::Gathering);
    assert!(h.rounds.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_leave_below_minimum_while_waiting_cancels_wait_timer() {
    let mut h = harness();
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(room, 1).await.unwrap();
    h.join(room, 2).await.unwrap();

    let mut sub = h.events.subscribe_room(room);
    h.pool.leave(&mut h.timers, room, ParticipantId(1)).unwrap();

    assert!(!h.timers.is_registered(&TimerKey::Wait(room)));
    assert_eq!(h.phase(room), RoomPhase::Gathering);
    assert!(
        !sub.drain()
            .iter()
            .any(|e| matches!(e, Event::CountdownCancelled { .. }))
    );

    // Back at the minimum, the wait starts over.
    h.join(room, 3).await.unwrap();
    assert_eq!(h.phase(room), RoomPhase::WaitingForMore);
}

#[tokio::test(start_paused = true)]
async fn test_leave_above_minimum_keeps_countdown() {
    let mut h = harness();
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    for id in 1..=3 {
        h.join(room, id).await.unwrap();
    }
    h.advance(Duration::from_secs(10)).await;

    h.pool.leave(&mut h.timers, room, ParticipantId(3)).unwrap();
    assert_eq!(h.phase(room), countdown(5));
    assert!(h.timers.is_registered(&TimerKey::Countdown(room)));
}

#[tokio::test(start_paused = true)]
async fn test_leave_last_participant_closes_room() {
    let mut h = harness();
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(room, 1).await.unwrap();

    let result = h.pool.leave(&mut h.timers, room, ParticipantId(1)).unwrap();
    assert!(result.is_none());
    assert!(h.pool.is_empty());
    assert_eq!(h.pool.room_of(ParticipantId(1)), None);
}

#[tokio::test(start_paused = true)]
async fn test_leave_stranger_is_not_in_room() {
    let mut h = harness();
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(room, 1).await.unwrap();
    let err = h
        .pool
        .leave(&mut h.timers, room, ParticipantId(9))
        .unwrap_err();
    assert!(matches!(err, LobbyError::NotInRoom(..)));
}

#[tokio::test(start_paused = true)]
async fn test_zero_countdown_starts_when_wait_elapses() {
    let config = PoolConfig {
        countdown_secs: 0,
        ..PoolConfig::default()
    };
    let mut h = harness_with(TierTable::default(), config, 64);
    let room = h.pool.find_or_open_room(Tier::Hard).room_id;
    h.join(room, 1).await.unwrap();
    h.join(room, 2).await.unwrap();

    let started = h.advance(Duration::from_secs(10)).await;
    assert_eq!(started.len(), 1);
    assert_eq!(h.rounds.get(started[0]).unwrap().tier, Tier::Hard);
}

// =========================================================================
// Hand-off
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_join_filling_room_starts_round_immediately() {
    let mut tiers = TierTable::default();
    tiers.easy.max_participants = 3;
    let mut h = harness_with(tiers, PoolConfig::default(), 64);
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(room, 1).await.unwrap();
    h.join(room, 2).await.unwrap();

    let snapshot = h.join(room, 3).await.unwrap();

    let round_id = snapshot.round_id().unwrap();
    assert_eq!(snapshot.phase.status(), RoundStatus::InProgress);
    assert!(h.pool.is_empty());
    assert!(!h.timers.is_registered(&TimerKey::Wait(room)));
    assert!(h.timers.is_registered(&TimerKey::Draw(round_id)));
    assert_eq!(h.rounds.get(round_id).unwrap().participants.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_round_start_failure_keeps_room_queued_and_retries() {
    let mut h = harness();
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(room, 1).await.unwrap();
    h.join(room, 2).await.unwrap();
    h.store.fail_creates(true).await;

    let mut sub = h.events.subscribe_room(room);
    h.advance(Duration::from_secs(10)).await;
    for _ in 0..5 {
        assert!(h.advance(Duration::from_secs(1)).await.is_empty());
    }

    assert!(sub.drain().contains(&Event::CountdownCancelled {
        reason: "round_start_failed".to_string(),
    }));
    let waiting = h.pool.room(room).unwrap();
    assert_eq!(waiting.len(), 2);
    assert_eq!(waiting.phase, RoomPhase::WaitingForMore);
    assert!(h.timers.is_registered(&TimerKey::Wait(room)));
    assert!(h.rounds.is_empty());

    h.store.fail_creates(false).await;
    h.advance(Duration::from_secs(10)).await;
    let mut started = Vec::new();
    for _ in 0..5 {
        started.extend(h.advance(Duration::from_secs(1)).await);
    }
    assert_eq!(started.len(), 1);
    assert!(h.pool.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_join_filling_room_start_failure_returns_seat() {
    let mut tiers = TierTable::default();
    tiers.easy.min_participants = 2;
    tiers.easy.max_participants = 2;
    let mut h = harness_with(tiers, PoolConfig::default(), 1);
    let held = TimerKey::Draw(RoundId(99));
    assert!(h.timers.register(held, Duration::from_secs(600), Instant::now()));
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    let mut sub = h.events.subscribe_room(room);
    h.join(room, 1).await.unwrap();
    sub.drain();

    let err = h.join(room, 2).await.unwrap_err();

    assert!(matches!(err, LobbyError::Round(RoundError::ResourceExhausted)));
    assert_eq!(h.pool.room(room).unwrap().len(), 1);
    assert_eq!(h.phase(room), RoomPhase::Gathering);
    assert_eq!(h.pool.room_of(ParticipantId(2)), None);
    assert!(sub.drain().contains(&Event::WaitingForPlayers {
        participants: 1,
        needed: 1,
    }));

    // With the slot back, the next join fills the room and starts it.
    h.timers.unregister(&held);
    let snapshot = h.join(room, 3).await.unwrap();
    let round_id = snapshot.round_id().unwrap();
    assert!(h.pool.is_empty());
    assert!(h.rounds.get(round_id).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_rearm_stalled_restores_lost_wait_timer() {
    let mut h = harness_with(TierTable::default(), PoolConfig::default(), 1);
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(room, 1).await.unwrap();
    h.join(room, 2).await.unwrap();

    // The wait timer is lost and its slot taken.
    h.timers.unregister(&TimerKey::Wait(room));
    let filler = TimerKey::Draw(RoundId(99));
    assert!(h.timers.register(filler, Duration::from_secs(600), Instant::now()));

    let started = h.pool.rearm_stalled(&mut h.timers, &mut h.rounds).await;
    assert!(started.is_empty());
    assert!(!h.timers.is_registered(&TimerKey::Wait(room)));

    h.timers.unregister(&filler);
    h.pool.rearm_stalled(&mut h.timers, &mut h.rounds).await;
    assert!(h.timers.is_registered(&TimerKey::Wait(room)));
    assert_eq!(h.phase(room), RoomPhase::WaitingForMore);

    h.advance(Duration::from_secs(10)).await;
    let mut started = Vec::new();
    for _ in 0..5 {
        started.extend(h.advance(Duration::from_secs(1)).await);
    }
    assert_eq!(started.len(), 1);
    assert!(h.pool.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rearm_stalled_leaves_healthy_rooms_alone() {
    let mut h = harness();
    let room = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(room, 1).await.unwrap();
    h.join(room, 2).await.unwrap();
    let lone = h.pool.find_or_open_room(Tier::Hard).room_id;
    h.join(lone, 3).await.unwrap();

    let started = h.pool.rearm_stalled(&mut h.timers, &mut h.rounds).await;

    assert!(started.is_empty());
    assert_eq!(h.timers.len(), 1);
    assert_eq!(h.phase(room), RoomPhase::WaitingForMore);
    assert_eq!(h.phase(lone), RoomPhase::Gathering);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_closes_rooms_and_timers() {
    let mut h = harness();
    let easy = h.pool.find_or_open_room(Tier::Easy).room_id;
    h.join(easy, 1).await.unwrap();
    h.join(easy, 2).await.unwrap();
    h.advance(Duration::from_secs(10)).await;
    let hard = h.pool.find_or_open_room(Tier::Hard).room_id;
    h.join(hard, 3).await.unwrap();

    let mut sub = h.events.subscribe_room(easy);
    let closed = h.pool.cancel_all(&mut h.timers, "shutdown");

    assert_eq!(closed, 2);
    assert!(h.pool.is_empty());
    assert_eq!(h.pool.queued_count(), 0);
    assert!(h.timers.is_empty());
    assert_eq!(
        sub.drain(),
        vec![Event::CountdownCancelled {
            reason: "shutdown".to_string(),
        }]
    );
}
