//! The engine task and its handle.
//!
//! One [`Engine`] per process owns the timer table, every round, every
//! waiting room and the lifecycle monitor. It runs as a single task that
//! alternates between two sources of work:
//!
//! - commands from [`EngineHandle`]s, each answered through a oneshot
//! - master clock ticks, which fire due timers and poll the monitor
//!
//! Nothing is shared across tasks except the command channel and the
//! [`Broadcaster`], so no state needs a lock.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use drawhall_lobby::{LobbyError, MatchmakingPool, RoomSnapshot};
use drawhall_monitor::LifecycleMonitor;
use drawhall_protocol::{
    Broadcaster, EndReason, ParticipantId, RoomId, RoomSubscription, RoundId, Tier,
};
use drawhall_round::{
    Board, Claim, ClaimVerdict, Entrant, RoundCoordinator, RoundError, RoundSnapshot, TimerKey,
    Timers,
};
use drawhall_store::RoundStore;
use drawhall_tick::{MasterClock, MemInfoProbe, PressureProbe};

use crate::{DrawhallError, EngineConfig};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Requests sent from an [`EngineHandle`] to the engine task.
pub(crate) enum EngineCommand {
    FindOrOpenRoom {
        tier: Tier,
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Join {
        room_id: RoomId,
        entrant: Entrant,
        reply: oneshot::Sender<Result<RoomSnapshot, LobbyError>>,
    },
    QuickJoin {
        tier: Tier,
        entrant: Entrant,
        reply: oneshot::Sender<Result<RoomSnapshot, LobbyError>>,
    },
    /// Leave a waiting room.
    Leave {
        room_id: RoomId,
        participant_id: ParticipantId,
        reply: oneshot::Sender<Result<Option<RoomSnapshot>, LobbyError>>,
    },
    SubmitClaim {
        round_id: RoundId,
        claim: Claim,
        reply: oneshot::Sender<ClaimVerdict>,
    },
    Disconnect {
        round_id: RoundId,
        participant_id: ParticipantId,
        reply: oneshot::Sender<Result<(), RoundError>>,
    },
    Reconnect {
        round_id: RoundId,
        participant_id: ParticipantId,
        reply: oneshot::Sender<Result<Board, RoundError>>,
    },
    /// Walk away from a running round.
    LeaveRound {
        round_id: RoundId,
        participant_id: ParticipantId,
        reply: oneshot::Sender<Result<(), RoundError>>,
    },
    Spectate {
        round_id: RoundId,
        participant_id: ParticipantId,
        reply: oneshot::Sender<Result<(), RoundError>>,
    },
    PauseRound {
        round_id: RoundId,
        reply: oneshot::Sender<Result<(), RoundError>>,
    },
    ResumeRound {
        round_id: RoundId,
        reply: oneshot::Sender<Result<(), RoundError>>,
    },
    RoundSnapshot {
        round_id: RoundId,
        reply: oneshot::Sender<Option<RoundSnapshot>>,
    },
    RoomSnapshot {
        room_id: RoomId,
        reply: oneshot::Sender<Option<RoomSnapshot>>,
    },
    /// Hold or release the master clock.
    SetClockPaused {
        paused: bool,
        reply: oneshot::Sender<()>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
    Shutdown {
        reply: oneshot::Sender<ShutdownReport>,
    },
}

/// Point-in-time counters for the whole engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Rounds still in progress.
    pub live_rounds: usize,
    /// Rounds held in memory, finished ones awaiting eviction included.
    pub rounds_held: usize,
    pub waiting_rooms: usize,
    pub queued_participants: usize,
    pub timers: usize,
    pub timer_capacity: usize,
    pub ticks: u64,
    pub tick_overruns: u64,
    pub clock_paused: bool,
    pub monitor_scans: u64,
}

/// What shutdown cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub rooms_closed: usize,
    pub rounds_ended: usize,
    pub refunds_issued: usize,
    /// Refunds the store refused. They stay owed.
    pub refunds_failed: usize,
}

// ---------------------------------------------------------------------------
// EngineHandle
// ---------------------------------------------------------------------------

/// Cheap-to-clone handle for talking to a running [`Engine`].
///
/// Every call fails with [`DrawhallError::EngineStopped`] once the engine
/// task has exited.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineCommand>,
    events: Broadcaster,
}

impl EngineHandle {
    /// Subscribes to one room's events: lobby traffic first, then the
    /// round it turns into.
    pub fn subscribe_room(&self, room_id: RoomId) -> RoomSubscription {
        self.events.subscribe_room(room_id)
    }

    pub fn events(&self) -> &Broadcaster {
        &self.events
    }

    /// Returns a room for `tier` that still has a free seat, opening one if
    /// needed.
    pub async fn find_or_open_room(&self, tier: Tier) -> Result<RoomSnapshot, DrawhallError> {
        self.request(|reply| EngineCommand::FindOrOpenRoom { tier, reply })
            .await
    }

    pub async fn join(
        &self,
        room_id: RoomId,
        entrant: Entrant,
    ) -> Result<RoomSnapshot, DrawhallError> {
        Ok(self
            .request(|reply| EngineCommand::Join {
                room_id,
                entrant,
                reply,
            })
            .await??)
    }

    pub async fn quick_join(
        &self,
        tier: Tier,
        entrant: Entrant,
    ) -> Result<RoomSnapshot, DrawhallError> {
        Ok(self
            .request(|reply| EngineCommand::QuickJoin {
                tier,
                entrant,
                reply,
            })
            .await??)
    }

    /// Leaves a waiting room. `None` means the room emptied and closed.
    pub async fn leave(
        &self,
        room_id: RoomId,
        participant_id: ParticipantId,
    ) -> Result<Option<RoomSnapshot>, DrawhallError> {
        Ok(self
            .request(|reply| EngineCommand::Leave {
                room_id,
                participant_id,
                reply,
            })
            .await??)
    }

    /// Claims a win. Rejections come back as a verdict, not an error.
    pub async fn submit_claim(
        &self,
        round_id: RoundId,
        claim: Claim,
    ) -> Result<ClaimVerdict, DrawhallError> {
        self.request(|reply| EngineCommand::SubmitClaim {
            round_id,
            claim,
            reply,
        })
        .await
    }

    pub async fn disconnect(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<(), DrawhallError> {
        Ok(self
            .request(|reply| EngineCommand::Disconnect {
                round_id,
                participant_id,
                reply,
            })
            .await??)
    }

    /// Returns the board the participant held before disconnecting.
    pub async fn reconnect(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<Board, DrawhallError> {
        Ok(self
            .request(|reply| EngineCommand::Reconnect {
                round_id,
                participant_id,
                reply,
            })
            .await??)
    }

    pub async fn leave_round(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<(), DrawhallError> {
        Ok(self
            .request(|reply| EngineCommand::LeaveRound {
                round_id,
                participant_id,
                reply,
            })
            .await??)
    }

    pub async fn spectate(
        &self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<(), DrawhallError> {
        Ok(self
            .request(|reply| EngineCommand::Spectate {
                round_id,
                participant_id,
                reply,
            })
            .await??)
    }

    pub async fn pause_round(&self, round_id: RoundId) -> Result<(), DrawhallError> {
        Ok(self
            .request(|reply| EngineCommand::PauseRound { round_id, reply })
            .await??)
    }

    pub async fn resume_round(&self, round_id: RoundId) -> Result<(), DrawhallError> {
        Ok(self
            .request(|reply| EngineCommand::ResumeRound { round_id, reply })
            .await??)
    }

    pub async fn round_snapshot(
        &self,
        round_id: RoundId,
    ) -> Result<Option<RoundSnapshot>, DrawhallError> {
        self.request(|reply| EngineCommand::RoundSnapshot { round_id, reply })
            .await
    }

    pub async fn room_snapshot(
        &self,
        room_id: RoomId,
    ) -> Result<Option<RoomSnapshot>, DrawhallError> {
        self.request(|reply| EngineCommand::RoomSnapshot { room_id, reply })
            .await
    }

    /// Holds the master clock. No timer fires and the monitor does not
    /// scan until [`resume_clock`](Self::resume_clock), but commands are
    /// still served. Deadlines keep running in wall time, so grace windows
    /// and idle timeouts that passed meanwhile settle on the first tick.
    pub async fn pause_clock(&self) -> Result<(), DrawhallError> {
        self.request(|reply| EngineCommand::SetClockPaused {
            paused: true,
            reply,
        })
        .await
    }

    /// Restarts the master clock one period from now.
    pub async fn resume_clock(&self) -> Result<(), DrawhallError> {
        self.request(|reply| EngineCommand::SetClockPaused {
            paused: false,
            reply,
        })
        .await
    }

    pub async fn stats(&self) -> Result<EngineStats, DrawhallError> {
        self.request(|reply| EngineCommand::Stats { reply }).await
    }

    /// Closes every waiting room, ends every live round with
    /// [`EndReason::Shutdown`], refunds stakes and stops the engine.
    pub async fn shutdown(&self) -> Result<ShutdownReport, DrawhallError> {
        self.request(|reply| EngineCommand::Shutdown { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, DrawhallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| DrawhallError::EngineStopped)?;
        reply_rx.await.map_err(|_| DrawhallError::EngineStopped)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The engine task's state. Build with [`Engine::new`], then either
/// [`spawn`](Engine::spawn) it or drive [`step`](Engine::step) by hand.
pub struct Engine<S: RoundStore> {
    timers: Timers,
    rounds: RoundCoordinator<S>,
    pool: MatchmakingPool,
    monitor: LifecycleMonitor,
    clock: MasterClock,
    probe: Box<dyn PressureProbe>,
    receiver: mpsc::Receiver<EngineCommand>,
}

impl<S: RoundStore> Engine<S> {
    /// Builds an engine and the handle that drives it.
    pub fn new(config: EngineConfig, store: Arc<S>) -> (Self, EngineHandle) {
        let config = config.validated();
        let events = Broadcaster::new(config.engine.event_capacity);
        let (sender, receiver) = mpsc::channel(config.engine.command_buffer);

        let engine = Self {
            clock: MasterClock::from_config(&config.timers),
            timers: Timers::new(config.timers),
            rounds: RoundCoordinator::new(config.round, store, events.clone()),
            pool: MatchmakingPool::new(config.pool, config.tiers, events.clone()),
            monitor: LifecycleMonitor::new(config.monitor),
            probe: Box::new(MemInfoProbe::new()),
            receiver,
        };
        (engine, EngineHandle { sender, events })
    }

    /// Replaces the host pressure probe.
    pub fn with_probe(mut self, probe: impl PressureProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Runs the engine on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Serves commands and clock ticks until shut down or until every
    /// handle is dropped.
    pub async fn run(mut self) {
        let interval = self.monitor.config().scan_interval;
        self.monitor.start(interval);
        info!(
            tick_period_ms = self.clock.period().as_millis() as u64,
            max_timers = self.timers.capacity(),
            "engine started"
        );

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(EngineCommand::Shutdown { reply }) => {
                        let report = self.shutdown().await;
                        let _ = reply.send(report);
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        info!("all engine handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                tick = self.clock.wait_for_tick() => {
                    self.step(tick.now).await;
                    self.clock.record_tick_end();
                }
            }
        }

        info!(
            ticks = self.clock.tick_count(),
            overruns = self.clock.metrics().total_overruns,
            "engine stopped"
        );
    }

    /// One master tick. Fires due timers and re-arms waiting rooms that
    /// lost theirs. Then sheds under host pressure and lets the monitor
    /// scan if its interval elapsed.
    pub async fn step(&mut self, now: Instant) {
        for key in self.timers.tick(now) {
            self.dispatch(key).await;
        }
        self.pool
            .rearm_stalled(&mut self.timers, &mut self.rounds)
            .await;
        if self.timers.pressure_sample_due() {
            self.shed_under_pressure().await;
        }
        self.monitor
            .poll(&mut self.timers, &mut self.rounds, now)
            .await;
    }

    pub fn stats(&self) -> EngineStats {
        let metrics = self.clock.metrics();
        EngineStats {
            live_rounds: self.rounds.live_round_ids().len(),
            rounds_held: self.rounds.len(),
            waiting_rooms: self.pool.len(),
            queued_participants: self.pool.queued_count(),
            timers: self.timers.len(),
            timer_capacity: self.timers.capacity(),
            ticks: metrics.total_ticks,
            tick_overruns: metrics.total_overruns,
            clock_paused: self.clock.is_paused(),
            monitor_scans: self.monitor.scans(),
        }
    }

    /// Routes a due key to whoever owns it. A round handler that fails has
    /// its key dropped and its round ended with [`EndReason::Error`], so
    /// one bad round never stalls the others.
    async fn dispatch(&mut self, key: TimerKey) {
        if key.room_id().is_some() {
            self.pool
                .on_timer(&mut self.timers, &mut self.rounds, key)
                .await;
            return;
        }

        let Err(e) = self.rounds.on_timer(&mut self.timers, key).await else {
            return;
        };
        warn!(?key, error = %e, "timer handler failed");
        self.timers.fail(&key);
        if let Some(round_id) = key.round_id() {
            match self
                .rounds
                .end(&mut self.timers, round_id, None, EndReason::Error)
                .await
            {
                Ok(true) => info!(%round_id, "round ended after timer failure"),
                Ok(false) => {}
                Err(e) => debug!(%round_id, error = %e, "no round to end after timer failure"),
            }
        }
    }

    async fn shed_under_pressure(&mut self) {
        let shed = self
            .timers
            .shed_if_pressured(self.probe.as_mut(), |key| {
                matches!(key, TimerKey::Draw(_))
            });
        for key in shed {
            let Some(round_id) = key.round_id() else {
                continue;
            };
            match self
                .rounds
                .end(&mut self.timers, round_id, None, EndReason::ResourceCleanup)
                .await
            {
                Ok(_) => warn!(%round_id, "round ended to relieve host pressure"),
                Err(e) => warn!(%round_id, error = %e, "failed to end shed round"),
            }
        }
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::FindOrOpenRoom { tier, reply } => {
                let _ = reply.send(self.pool.find_or_open_room(tier));
            }
            EngineCommand::Join {
                room_id,
                entrant,
                reply,
            } => {
                let result = self
                    .pool
                    .join(&mut self.timers, &mut self.rounds, room_id, entrant)
                    .await;
                let _ = reply.send(result);
            }
            EngineCommand::QuickJoin {
                tier,
                entrant,
                reply,
            } => {
                let result = self
                    .pool
                    .quick_join(&mut self.timers, &mut self.rounds, tier, entrant)
                    .await;
                let _ = reply.send(result);
            }
            EngineCommand::Leave {
                room_id,
                participant_id,
                reply,
            } => {
                let result = self.pool.leave(&mut self.timers, room_id, participant_id);
                let _ = reply.send(result);
            }
            EngineCommand::SubmitClaim {
                round_id,
                claim,
                reply,
            } => {
                let verdict = self
                    .rounds
                    .submit_claim(&mut self.timers, round_id, claim)
                    .await;
                let _ = reply.send(verdict);
            }
            EngineCommand::Disconnect {
                round_id,
                participant_id,
                reply,
            } => {
                let result = self
                    .rounds
                    .disconnect(&mut self.timers, round_id, participant_id)
                    .map(|_deadline| ());
                let _ = reply.send(result);
            }
            EngineCommand::Reconnect {
                round_id,
                participant_id,
                reply,
            } => {
                let result = self
                    .rounds
                    .reconnect(&mut self.timers, round_id, participant_id)
                    .await;
                let _ = reply.send(result);
            }
            EngineCommand::LeaveRound {
                round_id,
                participant_id,
                reply,
            } => {
                let result = self
                    .rounds
                    .leave(&mut self.timers, round_id, participant_id)
                    .await;
                let _ = reply.send(result);
            }
            EngineCommand::Spectate {
                round_id,
                participant_id,
                reply,
            } => {
                let _ = reply.send(self.rounds.add_spectator(round_id, participant_id));
            }
            EngineCommand::PauseRound { round_id, reply } => {
                let _ = reply.send(self.rounds.pause(&mut self.timers, round_id));
            }
            EngineCommand::ResumeRound { round_id, reply } => {
                let _ = reply.send(self.rounds.resume(&mut self.timers, round_id));
            }
            EngineCommand::RoundSnapshot { round_id, reply } => {
                let _ = reply.send(self.rounds.snapshot(round_id));
            }
            EngineCommand::RoomSnapshot { room_id, reply } => {
                let _ = reply.send(self.pool.snapshot(room_id));
            }
            EngineCommand::SetClockPaused { paused, reply } => {
                if paused {
                    self.clock.pause();
                } else {
                    self.clock.resume();
                }
                info!(paused, "master clock toggled");
                let _ = reply.send(());
            }
            EngineCommand::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            EngineCommand::Shutdown { reply } => {
                // Intercepted by the run loop; reached only when stepping by hand.
                let _ = reply.send(self.shutdown().await);
            }
        }
    }

    /// Closes rooms, ends live rounds with [`EndReason::Shutdown`] and
    /// runs one final monitor scan so their stakes are refunded.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        self.monitor.stop();
        let rooms_closed = self.pool.cancel_all(&mut self.timers, "shutdown");

        let mut rounds_ended = 0;
        for round_id in self.rounds.live_round_ids() {
            match self
                .rounds
                .end(&mut self.timers, round_id, None, EndReason::Shutdown)
                .await
            {
                Ok(true) => rounds_ended += 1,
                Ok(false) => {}
                Err(e) => warn!(%round_id, error = %e, "failed to end round on shutdown"),
            }
        }

        let scan = self
            .monitor
            .scan(&mut self.timers, &mut self.rounds, Instant::now())
            .await;
        let report = ShutdownReport {
            rooms_closed,
            rounds_ended,
            refunds_issued: scan.refunded.len(),
            refunds_failed: scan.refund_failures.len(),
        };
        info!(
            rooms_closed,
            rounds_ended,
            refunds = report.refunds_issued,
            refund_failures = report.refunds_failed,
            "engine shut down"
        );
        report
    }
}
