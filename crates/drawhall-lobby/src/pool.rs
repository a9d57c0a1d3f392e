//! The matchmaking pool: waiting rooms on their way to becoming rounds.
//!
//! Rooms are opened per tier on demand. A room that reaches its tier's
//! minimum arms a one-shot wait timer; when that elapses with the minimum
//! still met, a one-second countdown runs, and at zero the roster is handed
//! to [`RoundCoordinator::initialize`]. A room that fills up is handed off
//! straight away. Both timers live in the shared [`Timers`] table, so the
//! pool, like the coordinator, never sleeps on its own.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use drawhall_protocol::{
    Broadcaster, Event, LeaveReason, ParticipantId, RoomId, RoundId, Tier,
};
use drawhall_round::{Entrant, RoundCoordinator, TierTable, TimerKey, Timers};
use drawhall_store::RoundStore;

use crate::{LobbyError, PoolConfig, RoomPhase, RoomSnapshot, WaitingRoom};

const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// Manages every waiting room and tracks which participant waits where.
pub struct MatchmakingPool {
    rooms: BTreeMap<RoomId, WaitingRoom>,

    /// A participant waits in at most one room.
    queued: HashMap<ParticipantId, RoomId>,

    tiers: TierTable,
    config: PoolConfig,
    events: Broadcaster,
    next_room_id: u64,
}

impl MatchmakingPool {
    pub fn new(config: PoolConfig, tiers: TierTable, events: Broadcaster) -> Self {
        Self {
            rooms: BTreeMap::new(),
            queued: HashMap::new(),
            tiers: tiers.validated(),
            config,
            events,
            next_room_id: 0,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn room(&self, room_id: RoomId) -> Option<&WaitingRoom> {
        self.rooms.get(&room_id)
    }

    pub fn snapshot(&self, room_id: RoomId) -> Option<RoomSnapshot> {
        self.rooms.get(&room_id).map(WaitingRoom::snapshot)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &WaitingRoom> {
        self.rooms.values()
    }

    /// The room a participant is waiting in, if any.
    pub fn room_of(&self, participant_id: ParticipantId) -> Option<RoomId> {
        self.queued.get(&participant_id).copied()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Participants waiting across all rooms.
    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    // -----------------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------------

    /// Returns an open room for `tier` with a free seat, opening one with
    /// the tier's bounds if none exists.
    pub fn find_or_open_room(&mut self, tier: Tier) -> RoomSnapshot {
        if let Some(room) = self
            .rooms
            .values()
            .find(|r| r.tier == tier && r.phase.is_open() && !r.is_full())
        {
            return room.snapshot();
        }

        self.next_room_id += 1;
        let room_id = RoomId(self.next_room_id);
        let bounds = self.tiers.get(tier);
        let room = WaitingRoom::new(
            room_id,
            tier,
            bounds.min_participants,
            bounds.max_participants,
        );
        info!(
            %room_id,
            %tier,
            min = room.min_participants,
            max = room.max_participants,
            "room opened"
        );
        let snapshot = room.snapshot();
        self.rooms.insert(room_id, room);
        snapshot
    }

    /// Seats a participant in a waiting room.
    ///
    /// Reaching the minimum arms the wait timer. Filling the room hands it
    /// to the coordinator at once, in which case the returned snapshot is
    /// in [`RoomPhase::Started`]. If that hand-off fails the seat is given
    /// back and the error returned, so the caller can try again later.
    pub async fn join<S: RoundStore>(
        &mut self,
        timers: &mut Timers,
        rounds: &mut RoundCoordinator<S>,
        room_id: RoomId,
        entrant: Entrant,
    ) -> Result<RoomSnapshot, LobbyError> {
        if let Some(&current) = self.queued.get(&entrant.id) {
            return Err(LobbyError::AlreadyQueued(entrant.id, current));
        }
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(LobbyError::RoomNotFound(room_id))?;
        if room.is_full() {
            return Err(LobbyError::RoomFull(room_id));
        }

        let after = room.len() + 1;
        let arms_wait = room.phase == RoomPhase::Gathering
            && after >= room.min_participants
            && after < room.max_participants;
        if arms_wait && !timers.has_capacity() {
            warn!(%room_id, participant_id = %entrant.id, "join rejected: timer capacity exhausted");
            return Err(LobbyError::ResourceExhausted);
        }

        let participant_id = entrant.id;
        room.roster.push(entrant);
        self.queued.insert(participant_id, room_id);
        self.events.publish(
            room_id,
            Event::ParticipantJoined {
                participant_id,
                participants: room.len(),
            },
        );
        info!(%room_id, %participant_id, participants = room.len(), "participant joined room");

        if room.is_full() {
            return match self.start_round(timers, rounds, room_id).await {
                Ok(started) => Ok(started),
                Err(e) => {
                    warn!(%room_id, %participant_id, error = %e, "join rejected: round start failed");
                    if let Err(gone) = self.leave(timers, room_id, participant_id) {
                        debug!(%room_id, %participant_id, error = %gone, "seat already gone");
                    }
                    Err(e)
                }
            };
        }

        if room.has_minimum() {
            if room.phase == RoomPhase::Gathering {
                arm_wait(timers, room, self.config.wait_for_players);
            }
        } else {
            self.events.publish(
                room_id,
                Event::WaitingForPlayers {
                    participants: room.len(),
                    needed: room.needed(),
                },
            );
        }
        Ok(room.snapshot())
    }

    /// Finds or opens a room for `tier` and joins it.
    pub async fn quick_join<S: RoundStore>(
        &mut self,
        timers: &mut Timers,
        rounds: &mut RoundCoordinator<S>,
        tier: Tier,
        entrant: Entrant,
    ) -> Result<RoomSnapshot, LobbyError> {
        if let Some(current) = self.room_of(entrant.id) {
            return Err(LobbyError::AlreadyQueued(entrant.id, current));
        }
        let room_id = self.find_or_open_room(tier).room_id;
        self.join(timers, rounds, room_id, entrant).await
    }

    /// Takes a participant out of a waiting room.
    ///
    /// Returns `None` if the room emptied and was closed. Dropping below
    /// the minimum cancels the wait timer and any countdown.
    pub fn leave(
        &mut self,
        timers: &mut Timers,
        room_id: RoomId,
        participant_id: ParticipantId,
    ) -> Result<Option<RoomSnapshot>, LobbyError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(LobbyError::RoomNotFound(room_id))?;
        let pos = room
            .roster
            .iter()
            .position(|e| e.id == participant_id)
            .ok_or(LobbyError::NotInRoom(participant_id, room_id))?;
        room.roster.remove(pos);
        self.queued.remove(&participant_id);

        self.events.publish(
            room_id,
            Event::ParticipantLeft {
                participant_id,
                reason: LeaveReason::Left,
            },
        );
        info!(%room_id, %participant_id, participants = room.len(), "participant left room");

        if room.is_empty() {
            cancel_timers(timers, room_id);
            self.rooms.remove(&room_id);
            info!(%room_id, "empty room closed");
            return Ok(None);
        }

        if !room.has_minimum() && room.phase != RoomPhase::Gathering {
            cancel_timers(timers, room_id);
            if room.phase.is_counting_down() {
                self.events.publish(
                    room_id,
                    Event::CountdownCancelled {
                        reason: "below_minimum".to_string(),
                    },
                );
            }
            room.phase = RoomPhase::Gathering;
            info!(%room_id, needed = room.needed(), "room below minimum, countdown cancelled");
        }
        if !room.has_minimum() {
            self.events.publish(
                room_id,
                Event::WaitingForPlayers {
                    participants: room.len(),
                    needed: room.needed(),
                },
            );
        }
        Ok(Some(room.snapshot()))
    }

    /// Closes every waiting room. Returns how many were closed.
    pub fn cancel_all(&mut self, timers: &mut Timers, reason: &str) -> usize {
        let closed = self.rooms.len();
        for (room_id, room) in std::mem::take(&mut self.rooms) {
            cancel_timers(timers, room_id);
            if room.phase.is_counting_down() {
                self.events.publish(
                    room_id,
                    Event::CountdownCancelled {
                        reason: reason.to_string(),
                    },
                );
            }
        }
        self.queued.clear();
        if closed > 0 {
            info!(closed, reason, "waiting rooms closed");
        }
        closed
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Handles a due room timer. Returns the round a room became, if any.
    /// Round timers are ignored.
    pub async fn on_timer<S: RoundStore>(
        &mut self,
        timers: &mut Timers,
        rounds: &mut RoundCoordinator<S>,
        key: TimerKey,
    ) -> Option<RoundId> {
        match key {
            TimerKey::Wait(room_id) => self.wait_elapsed(timers, rounds, room_id).await,
            TimerKey::Countdown(room_id) => self.countdown_step(timers, rounds, room_id).await,
            _ => None,
        }
    }

    /// Re-arms rooms left without the timer their phase relies on, which
    /// happens when a registration failed at the ceiling or a timer was
    /// dropped. A full room is started directly. Returns rounds started.
    pub async fn rearm_stalled<S: RoundStore>(
        &mut self,
        timers: &mut Timers,
        rounds: &mut RoundCoordinator<S>,
    ) -> Vec<RoundId> {
        let stalled: Vec<RoomId> = self
            .rooms
            .values()
            .filter(|r| is_stalled(timers, r))
            .map(|r| r.id)
            .collect();

        let mut started = Vec::new();
        for room_id in stalled {
            if !timers.has_capacity() {
                break;
            }
            let full = match self.rooms.get(&room_id) {
                Some(room) => room.is_full(),
                None => continue,
            };
            if full {
                started.extend(self.try_start(timers, rounds, room_id).await);
                continue;
            }
            if let Some(room) = self.rooms.get_mut(&room_id) {
                info!(%room_id, phase = ?room.phase, "re-arming stalled room");
                if room.phase.is_counting_down() {
                    self.events.publish(
                        room_id,
                        Event::CountdownCancelled {
                            reason: "timer_lost".to_string(),
                        },
                    );
                }
                room.phase = RoomPhase::Gathering;
                arm_wait(timers, room, self.config.wait_for_players);
            }
        }
        started
    }

    async fn wait_elapsed<S: RoundStore>(
        &mut self,
        timers: &mut Timers,
        rounds: &mut RoundCoordinator<S>,
        room_id: RoomId,
    ) -> Option<RoundId> {
        let countdown = self.config.countdown_secs;
        let room = self.rooms.get_mut(&room_id)?;
        if room.phase != RoomPhase::WaitingForMore {
            return None;
        }
        if !room.has_minimum() {
            room.phase = RoomPhase::Gathering;
            return None;
        }
        if countdown == 0 {
            return self.try_start(timers, rounds, room_id).await;
        }
        if !timers.register(TimerKey::Countdown(room_id), COUNTDOWN_STEP, Instant::now()) {
            warn!(%room_id, "countdown not scheduled, starting round now");
            return self.try_start(timers, rounds, room_id).await;
        }

        room.phase = RoomPhase::CountingDown {
            seconds_remaining: countdown,
        };
        self.events.publish(
            room_id,
            Event::CountdownTick {
                seconds_remaining: countdown,
            },
        );
        info!(%room_id, participants = room.len(), seconds = countdown, "countdown started");
        None
    }

    async fn countdown_step<S: RoundStore>(
        &mut self,
        timers: &mut Timers,
        rounds: &mut RoundCoordinator<S>,
        room_id: RoomId,
    ) -> Option<RoundId> {
        let Some(room) = self.rooms.get_mut(&room_id) else {
            timers.unregister(&TimerKey::Countdown(room_id));
            return None;
        };
        let RoomPhase::CountingDown { seconds_remaining } = room.phase else {
            timers.unregister(&TimerKey::Countdown(room_id));
            return None;
        };

        let left = seconds_remaining.saturating_sub(1);
        if left == 0 {
            return self.try_start(timers, rounds, room_id).await;
        }
        room.phase = RoomPhase::CountingDown {
            seconds_remaining: left,
        };
        self.events.publish(
            room_id,
            Event::CountdownTick {
                seconds_remaining: left,
            },
        );
        debug!(%room_id, seconds_remaining = left, "countdown tick");
        None
    }

    async fn try_start<S: RoundStore>(
        &mut self,
        timers: &mut Timers,
        rounds: &mut RoundCoordinator<S>,
        room_id: RoomId,
    ) -> Option<RoundId> {
        self.start_round(timers, rounds, room_id)
            .await
            .ok()
            .and_then(|snapshot| snapshot.round_id())
    }

    /// Hands a room's roster to the coordinator.
    ///
    /// On success the room leaves the pool. On failure it goes back to
    /// `Gathering` with its roster intact and the wait timer re-armed.
    async fn start_round<S: RoundStore>(
        &mut self,
        timers: &mut Timers,
        rounds: &mut RoundCoordinator<S>,
        room_id: RoomId,
    ) -> Result<RoomSnapshot, LobbyError> {
        cancel_timers(timers, room_id);
        let room = self
            .rooms
            .get(&room_id)
            .ok_or(LobbyError::RoomNotFound(room_id))?;
        let tier = room.tier;
        let entrants = room.roster.clone();

        match rounds
            .initialize(timers, room_id, tier, self.tiers.get(tier), &entrants)
            .await
        {
            Ok(round_id) => {
                let mut snapshot = room.snapshot();
                snapshot.phase = RoomPhase::Started { round_id };
                self.rooms.remove(&room_id);
                for entrant in &entrants {
                    self.queued.remove(&entrant.id);
                }
                info!(%room_id, %round_id, participants = entrants.len(), "room handed to round");
                Ok(snapshot)
            }
            Err(e) => {
                warn!(%room_id, error = %e, "round start failed, room stays queued");
                let wait = self.config.wait_for_players;
                if let Some(room) = self.rooms.get_mut(&room_id) {
                    room.phase = RoomPhase::Gathering;
                    self.events.publish(
                        room_id,
                        Event::CountdownCancelled {
                            reason: "round_start_failed".to_string(),
                        },
                    );
                    if room.has_minimum() {
                        arm_wait(timers, room, wait);
                    }
                }
                Err(e.into())
            }
        }
    }
}

fn arm_wait(timers: &mut Timers, room: &mut WaitingRoom, wait: Duration) {
    if timers.register_once(TimerKey::Wait(room.id), wait, Instant::now()) {
        room.phase = RoomPhase::WaitingForMore;
        debug!(room_id = %room.id, wait_ms = wait.as_millis() as u64, "waiting for more players");
    } else {
        warn!(room_id = %room.id, "wait timer not scheduled, room stays gathering");
    }
}

/// A room that should be on a timer but is not.
fn is_stalled(timers: &Timers, room: &WaitingRoom) -> bool {
    match room.phase {
        RoomPhase::Gathering => room.has_minimum(),
        RoomPhase::WaitingForMore => !timers.is_registered(&TimerKey::Wait(room.id)),
        RoomPhase::CountingDown { .. } => !timers.is_registered(&TimerKey::Countdown(room.id)),
        RoomPhase::Started { .. } => false,
    }
}

fn cancel_timers(timers: &mut Timers, room_id: RoomId) {
    timers.unregister(&TimerKey::Wait(room_id));
    timers.unregister(&TimerKey::Countdown(room_id));
}
