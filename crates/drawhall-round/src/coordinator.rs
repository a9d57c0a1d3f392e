//! The round coordinator: authoritative state for every live round.
//!
//! The coordinator never owns a clock or a lock. The engine that owns it
//! also owns the [`Timers`] table and passes it in on every call, so all
//! round mutation happens on one task. The store is consulted only where
//! another process could disagree: opening a round, committing a winner,
//! and writing the final outcome.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use drawhall_protocol::{
    Broadcaster, EndReason, Event, LateReason, LeaveReason, ParticipantId, RoomId, RoundId,
    RoundStatus, Tier,
};
use drawhall_store::{AuditAction, AuditEntry, RoundStore};

use crate::board::Board;
use crate::claim::{Claim, ClaimRecord, ClaimRejection, ClaimVerdict, validate};
use crate::planner::compute_plan;
use crate::round::{Entrant, Participant, Presence, Round, RoundSnapshot};
use crate::{RoundConfig, RoundError, TierConfig, TimerKey, Timers};

pub struct RoundCoordinator<S> {
    rounds: BTreeMap<RoundId, Round>,
    store: Arc<S>,
    events: Broadcaster,
    config: RoundConfig,
    rng: StdRng,
    claim_seq: u64,
}

impl<S: RoundStore> RoundCoordinator<S> {
    pub fn new(config: RoundConfig, store: Arc<S>, events: Broadcaster) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            rounds: BTreeMap::new(),
            store,
            events,
            config,
            rng,
            claim_seq: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn get(&self, round_id: RoundId) -> Option<&Round> {
        self.rounds.get(&round_id)
    }

    pub fn snapshot(&self, round_id: RoundId) -> Option<RoundSnapshot> {
        self.rounds.get(&round_id).map(Round::snapshot)
    }

    pub fn rounds(&self) -> impl Iterator<Item = &Round> {
        self.rounds.values()
    }

    /// Ids of rounds still being played.
    pub fn live_round_ids(&self) -> Vec<RoundId> {
        self.rounds
            .values()
            .filter(|r| r.is_in_progress())
            .map(|r| r.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn events(&self) -> &Broadcaster {
        &self.events
    }

    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Start
    // -----------------------------------------------------------------------

    /// Opens a round for a filled room: writes the opening record, deals
    /// one board per entrant and registers the draw timer.
    ///
    /// Nothing is kept if the opening record cannot be written.
    pub async fn initialize(
        &mut self,
        timers: &mut Timers,
        room_id: RoomId,
        tier: Tier,
        tier_config: &TierConfig,
        entrants: &[Entrant],
    ) -> Result<RoundId, RoundError> {
        if entrants.is_empty() {
            return Err(RoundError::NoParticipants);
        }
        if !timers.has_capacity() {
            warn!(%room_id, "round not started: timer capacity exhausted");
            return Err(RoundError::ResourceExhausted);
        }

        let ids: Vec<ParticipantId> = entrants.iter().map(|e| e.id).collect();
        let round_id = self
            .store
            .create_round(room_id, tier, &ids)
            .await
            .map_err(|e| {
                error!(%room_id, error = %e, "failed to write round opening record");
                RoundError::Persistence(e)
            })?;

        let now = Instant::now();
        if !timers.register(TimerKey::Draw(round_id), tier_config.draw_interval, now) {
            return Err(RoundError::ResourceExhausted);
        }

        let participants = entrants
            .iter()
            .map(|e| Participant {
                id: e.id,
                name: e.name.clone(),
                board: Board::deal(&mut self.rng),
                stake: tier_config.stake,
                presence: Presence::Active,
                refunded: false,
                last_seen: now,
                claimed_at: None,
                claimed_pattern: None,
            })
            .collect();

        self.rounds.insert(
            round_id,
            Round {
                id: round_id,
                room_id,
                tier,
                draw_interval: tier_config.draw_interval,
                patterns: tier_config.patterns.clone(),
                status: RoundStatus::InProgress,
                drawn: Default::default(),
                participants,
                spectators: Vec::new(),
                winner: None,
                winner_claimed: false,
                end_reason: None,
                started_at: now,
                ended_at: None,
                last_activity: now,
                paused: false,
                claims: Vec::new(),
                persist_pending: false,
            },
        );

        self.events.publish(
            room_id,
            Event::RoundStarted {
                room_id,
                round_id,
                tier,
                participants: ids,
                interval_ms: u64::try_from(tier_config.draw_interval.as_millis())
                    .unwrap_or(u64::MAX),
            },
        );
        info!(%round_id, %room_id, %tier, participants = entrants.len(), "round started");
        Ok(round_id)
    }

    // -----------------------------------------------------------------------
    // Draws
    // -----------------------------------------------------------------------

    /// Reveals the next number. Called when the round's draw timer fires.
    ///
    /// Returns `None` if nothing was drawn because the round is over.
    pub async fn draw(
        &mut self,
        timers: &mut Timers,
        round_id: RoundId,
    ) -> Result<Option<u8>, RoundError> {
        let round = self
            .rounds
            .get(&round_id)
            .ok_or(RoundError::NotFound(round_id))?;
        if !round.is_in_progress() {
            timers.unregister(&TimerKey::Draw(round_id));
            return Ok(None);
        }

        let plan = compute_plan(round, self.config.difficulty);
        let undrawn: Vec<u8> = round.drawn.undrawn().collect();
        let picked = plan
            .next_number(&round.drawn)
            .or_else(|| undrawn.choose(&mut self.rng).copied());
        let Some(number) = picked else {
            self.end(timers, round_id, None, EndReason::NumbersExhausted)
                .await?;
            return Ok(None);
        };

        let now = Instant::now();
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(RoundError::NotFound(round_id))?;
        round.drawn.insert(number);
        round.last_activity = now;
        let remaining = round.drawn.remaining();
        let room_id = round.room_id;
        timers.touch(&TimerKey::Draw(round_id), now);

        self.events
            .publish(room_id, Event::NumberDrawn { number, remaining });
        debug!(%round_id, number, remaining, biased = plan.should_bias(), "number drawn");

        if let Err(e) = self.store.append_drawn_number(round_id, number).await {
            warn!(%round_id, number, error = %e, "failed to persist drawn number");
        }

        if remaining == 0 {
            self.events.publish(room_id, Event::DrawExhausted);
            self.end(timers, round_id, None, EndReason::NumbersExhausted)
                .await?;
        }
        Ok(Some(number))
    }

    // -----------------------------------------------------------------------
    // Claims
    // -----------------------------------------------------------------------

    /// Adjudicates a claim. Never fails: problems become a verdict.
    ///
    /// Claims are handled in arrival order. The first locally valid claim
    /// that wins the store's compare-and-set is the winner; later ones see
    /// `already_decided`, and a claim that lost to another process sees
    /// `raced`.
    pub async fn submit_claim(
        &mut self,
        timers: &mut Timers,
        round_id: RoundId,
        claim: Claim,
    ) -> ClaimVerdict {
        let (verdict, decided) = self.adjudicate(round_id, &claim).await;
        self.record_claim(round_id, claim, verdict).await;

        if let Some(winner) = decided {
            if let Err(e) = self
                .end(timers, round_id, Some(winner), EndReason::Winner)
                .await
            {
                warn!(%round_id, error = %e, "failed to end decided round");
            }
        }
        verdict
    }

    /// Returns the verdict and, if the round became decided, its winner.
    async fn adjudicate(
        &mut self,
        round_id: RoundId,
        claim: &Claim,
    ) -> (ClaimVerdict, Option<ParticipantId>) {
        let pid = claim.participant_id;
        let Some(round) = self.rounds.get(&round_id) else {
            return (ClaimVerdict::Invalid(ClaimRejection::RoundNotInProgress), None);
        };
        if round.winner_claimed {
            return (ClaimVerdict::Late(LateReason::AlreadyDecided), None);
        }
        if !round.is_in_progress() {
            return (ClaimVerdict::Invalid(ClaimRejection::RoundNotInProgress), None);
        }
        let Some(participant) = round.participant(pid) else {
            return (ClaimVerdict::Invalid(ClaimRejection::UnknownParticipant), None);
        };
        if !participant.is_active() {
            return (ClaimVerdict::Invalid(ClaimRejection::NotActive), None);
        }
        if !round.patterns.contains(&claim.pattern) {
            return (ClaimVerdict::Invalid(ClaimRejection::PatternNotAllowed), None);
        }
        if let Err(rejection) = validate(
            &participant.board,
            &round.drawn,
            claim.pattern,
            &claim.cells,
        ) {
            return (ClaimVerdict::Invalid(rejection), None);
        }

        // In-memory state only speaks for this process.
        match self.store.fetch_round(round_id).await {
            Ok(record) => {
                if let Some(other) = record.winner {
                    if other != pid {
                        self.flip_winner(round_id, other);
                        return (ClaimVerdict::Late(LateReason::Raced), Some(other));
                    }
                }
            }
            Err(e) => {
                warn!(%round_id, participant_id = %pid, error = %e, "claim check against store failed");
                return (ClaimVerdict::Invalid(ClaimRejection::StoreUnavailable), None);
            }
        }

        let commit = match self.store.commit_winner_if_absent(round_id, pid).await {
            Ok(commit) => commit,
            Err(e) => {
                error!(%round_id, participant_id = %pid, error = %e, "winner commit failed");
                return (ClaimVerdict::Invalid(ClaimRejection::StoreUnavailable), None);
            }
        };

        self.flip_winner(round_id, commit.winner);
        if commit.winner == pid {
            (ClaimVerdict::Winner, Some(pid))
        } else {
            (ClaimVerdict::Late(LateReason::Raced), Some(commit.winner))
        }
    }

    /// The local half of the winner commit.
    fn flip_winner(&mut self, round_id: RoundId, winner: ParticipantId) {
        if let Some(round) = self.rounds.get_mut(&round_id) {
            if !round.winner_claimed {
                round.winner_claimed = true;
                round.winner = Some(winner);
            }
        }
    }

    async fn record_claim(&mut self, round_id: RoundId, claim: Claim, verdict: ClaimVerdict) {
        self.claim_seq += 1;
        let seq = self.claim_seq;
        let pid = claim.participant_id;
        let Some(round) = self.rounds.get_mut(&round_id) else {
            debug!(%round_id, participant_id = %pid, "claim for unknown round");
            return;
        };

        let now = Instant::now();
        round.last_activity = now;
        if let Some(p) = round.participant_mut(pid) {
            p.last_seen = now;
            if verdict.accepted() && p.claimed_at.is_none() {
                p.claimed_at = Some(now);
                p.claimed_pattern = Some(claim.pattern);
            }
        }
        let room_id = round.room_id;
        let detail = format!("{} {:?}", claim.pattern, verdict);
        round.claims.push(ClaimRecord {
            seq,
            claim,
            verdict,
            drawn_count: round.drawn.len(),
        });

        self.events.publish(
            room_id,
            Event::ClaimResult {
                participant_id: pid,
                accepted: verdict.accepted(),
                is_winner: verdict.is_winner(),
                late_reason: verdict.late_reason(),
            },
        );
        info!(%round_id, participant_id = %pid, seq, ?verdict, "claim adjudicated");

        let entry = AuditEntry::new(AuditAction::ClaimSubmitted, detail)
            .round(round_id)
            .room(room_id)
            .participant(pid);
        if let Err(e) = self.store.record_audit(entry).await {
            warn!(%round_id, error = %e, "failed to audit claim");
        }
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    /// Marks a participant disconnected and starts their grace window.
    /// The seat and board are kept. Returns the reconnect deadline.
    pub fn disconnect(
        &mut self,
        timers: &mut Timers,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<Instant, RoundError> {
        let grace = self.config.reconnect_grace;
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(RoundError::NotFound(round_id))?;
        if !round.is_in_progress() {
            return Err(RoundError::NotInProgress(round_id, round.status));
        }
        let room_id = round.room_id;
        let participant = round
            .participant_mut(participant_id)
            .ok_or(RoundError::ParticipantNotFound(participant_id, round_id))?;
        match participant.presence {
            Presence::Removed(_) => return Err(RoundError::Removed(participant_id, round_id)),
            Presence::Disconnected { deadline } => return Ok(deadline),
            Presence::Active => {}
        }

        let now = Instant::now();
        let deadline = now + grace;
        participant.presence = Presence::Disconnected { deadline };
        participant.last_seen = now;

        if !timers.register_once(TimerKey::Reconnect(round_id, participant_id), grace, now) {
            warn!(%round_id, %participant_id, "reconnect deadline not scheduled, monitor will expire it");
        }
        self.events.publish(
            room_id,
            Event::ParticipantDisconnected {
                participant_id,
                deadline_secs: grace.as_secs(),
            },
        );
        info!(%round_id, %participant_id, grace_secs = grace.as_secs(), "participant disconnected");
        Ok(deadline)
    }

    /// Restores a disconnected participant with the board they already had.
    ///
    /// Past the deadline the participant is removed and this fails with
    /// [`RoundError::ReconnectExpired`].
    pub async fn reconnect(
        &mut self,
        timers: &mut Timers,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<Board, RoundError> {
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(RoundError::NotFound(round_id))?;
        let status = round.status;
        let room_id = round.room_id;
        let participant = round
            .participant_mut(participant_id)
            .ok_or(RoundError::ParticipantNotFound(participant_id, round_id))?;

        let deadline = match participant.presence {
            Presence::Active => return Err(RoundError::NotDisconnected(participant_id)),
            Presence::Removed(_) => return Err(RoundError::ReconnectExpired(participant_id)),
            Presence::Disconnected { deadline } => deadline,
        };
        if status.is_terminal() {
            return Err(RoundError::NotInProgress(round_id, status));
        }

        let now = Instant::now();
        if now >= deadline {
            self.remove(timers, round_id, participant_id, LeaveReason::GraceExpired)
                .await?;
            return Err(RoundError::ReconnectExpired(participant_id));
        }

        participant.presence = Presence::Active;
        participant.last_seen = now;
        let board = participant.board.clone();
        round.last_activity = now;
        timers.unregister(&TimerKey::Reconnect(round_id, participant_id));

        self.events
            .publish(room_id, Event::ParticipantReconnected { participant_id });
        info!(%round_id, %participant_id, "participant reconnected");
        Ok(board)
    }

    /// Removes a participant whose grace window elapsed. A no-op if they
    /// reconnected in the meantime.
    pub async fn expire_participant(
        &mut self,
        timers: &mut Timers,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<(), RoundError> {
        let still_away = self
            .rounds
            .get(&round_id)
            .and_then(|r| r.participant(participant_id))
            .is_some_and(|p| matches!(p.presence, Presence::Disconnected { .. }));
        if !still_away {
            return Ok(());
        }
        self.remove(timers, round_id, participant_id, LeaveReason::GraceExpired)
            .await
    }

    /// Expires every disconnected participant whose deadline has passed.
    /// Backstop for deadlines whose timer could not be registered.
    pub async fn expire_overdue(&mut self, timers: &mut Timers, now: Instant) -> usize {
        let overdue: Vec<(RoundId, ParticipantId)> = self
            .rounds
            .values()
            .filter(|r| r.is_in_progress())
            .flat_map(|r| {
                r.participants
                    .iter()
                    .filter(|p| p.reconnect_deadline().is_some_and(|d| d <= now))
                    .map(move |p| (r.id, p.id))
            })
            .collect();

        let mut expired = 0;
        for (round_id, participant_id) in overdue {
            match self.expire_participant(timers, round_id, participant_id).await {
                Ok(()) => expired += 1,
                Err(e) => warn!(%round_id, %participant_id, error = %e, "failed to expire participant"),
            }
        }
        expired
    }

    /// A participant walks away from a round. Spectators just stop watching.
    pub async fn leave(
        &mut self,
        timers: &mut Timers,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<(), RoundError> {
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(RoundError::NotFound(round_id))?;
        if let Some(pos) = round.spectators.iter().position(|&s| s == participant_id) {
            round.spectators.remove(pos);
            return Ok(());
        }
        if !round.is_in_progress() {
            return Err(RoundError::NotInProgress(round_id, round.status));
        }
        let participant = round
            .participant(participant_id)
            .ok_or(RoundError::ParticipantNotFound(participant_id, round_id))?;
        if let Presence::Removed(_) = participant.presence {
            return Err(RoundError::Removed(participant_id, round_id));
        }
        self.remove(timers, round_id, participant_id, LeaveReason::Left)
            .await
    }

    /// Vacates a seat, then settles the round if too few remain.
    async fn remove(
        &mut self,
        timers: &mut Timers,
        round_id: RoundId,
        participant_id: ParticipantId,
        reason: LeaveReason,
    ) -> Result<(), RoundError> {
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(RoundError::NotFound(round_id))?;
        let participant = round
            .participant_mut(participant_id)
            .ok_or(RoundError::ParticipantNotFound(participant_id, round_id))?;
        participant.presence = Presence::Removed(reason);
        timers.unregister(&TimerKey::Reconnect(round_id, participant_id));

        let room_id = round.room_id;
        let in_progress = round.is_in_progress();
        let decided = round.winner_claimed;
        let seated: Vec<ParticipantId> = round.seated().map(|p| p.id).collect();

        self.events.publish(
            room_id,
            Event::ParticipantLeft {
                participant_id,
                reason,
            },
        );
        info!(%round_id, %participant_id, ?reason, remaining = seated.len(), "participant left");

        if !in_progress {
            return Ok(());
        }
        match seated.as_slice() {
            [] => {
                self.end(timers, round_id, None, EndReason::AllPlayersLeft)
                    .await?;
            }
            [last] if !decided => {
                self.award_last_standing(timers, round_id, *last).await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn award_last_standing(
        &mut self,
        timers: &mut Timers,
        round_id: RoundId,
        last: ParticipantId,
    ) -> Result<(), RoundError> {
        // Without the store's verdict the round stays open and undecided.
        // The last participant can still claim, and the monitor ends it
        // once it goes idle.
        let winner = match self.store.commit_winner_if_absent(round_id, last).await {
            Ok(commit) => commit.winner,
            Err(e) => {
                error!(%round_id, participant_id = %last, error = %e, "winner commit failed for last player standing");
                return Ok(());
            }
        };
        self.flip_winner(round_id, winner);
        let reason = if winner == last {
            EndReason::LastPlayerStanding
        } else {
            EndReason::Winner
        };
        self.end(timers, round_id, Some(winner), reason).await?;
        Ok(())
    }

    /// Lets someone watch a round without a board or a seat.
    pub fn add_spectator(
        &mut self,
        round_id: RoundId,
        participant_id: ParticipantId,
    ) -> Result<(), RoundError> {
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(RoundError::NotFound(round_id))?;
        if round.status.is_terminal() {
            return Err(RoundError::NotInProgress(round_id, round.status));
        }
        if round.participant(participant_id).is_none()
            && !round.spectators.contains(&participant_id)
        {
            round.spectators.push(participant_id);
            debug!(%round_id, %participant_id, "spectator added");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pause / resume
    // -----------------------------------------------------------------------

    /// Suspends draws. A paused round still counts as idle.
    pub fn pause(&mut self, timers: &mut Timers, round_id: RoundId) -> Result<(), RoundError> {
        let round = self.in_progress_mut(round_id)?;
        if !round.paused {
            round.paused = true;
            timers.pause(&TimerKey::Draw(round_id));
            info!(%round_id, "round paused");
        }
        Ok(())
    }

    pub fn resume(&mut self, timers: &mut Timers, round_id: RoundId) -> Result<(), RoundError> {
        let round = self.in_progress_mut(round_id)?;
        if round.paused {
            let now = Instant::now();
            round.paused = false;
            round.last_activity = now;
            timers.resume(&TimerKey::Draw(round_id), now);
            info!(%round_id, "round resumed");
        }
        Ok(())
    }

    fn in_progress_mut(&mut self, round_id: RoundId) -> Result<&mut Round, RoundError> {
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(RoundError::NotFound(round_id))?;
        if !round.is_in_progress() {
            return Err(RoundError::NotInProgress(round_id, round.status));
        }
        Ok(round)
    }

    // -----------------------------------------------------------------------
    // End and eviction
    // -----------------------------------------------------------------------

    /// Ends a round. Returns `false` if it had already ended.
    ///
    /// Stops the draw timer and every grace deadline, announces the
    /// result, writes it to the store and schedules eviction. If the
    /// write fails the round is kept with `persist_pending` set.
    pub async fn end(
        &mut self,
        timers: &mut Timers,
        round_id: RoundId,
        winner: Option<ParticipantId>,
        reason: EndReason,
    ) -> Result<bool, RoundError> {
        let round = self
            .rounds
            .get_mut(&round_id)
            .ok_or(RoundError::NotFound(round_id))?;
        if round.status.is_terminal() {
            debug!(%round_id, status = %round.status, "end ignored, round already over");
            return Ok(false);
        }
        let target = if reason.is_abandonment() {
            RoundStatus::Abandoned
        } else {
            RoundStatus::Finished
        };
        if !round.status.can_transition_to(target) {
            return Err(RoundError::InvalidTransition {
                from: round.status,
                to: target,
            });
        }

        round.status = target;
        round.end_reason = Some(reason);
        round.ended_at = Some(Instant::now());
        if winner.is_some() {
            round.winner = winner;
            round.winner_claimed = true;
        }

        timers.unregister(&TimerKey::Draw(round_id));
        for p in &round.participants {
            timers.unregister(&TimerKey::Reconnect(round_id, p.id));
        }

        let room_id = round.room_id;
        let winner = round.winner;
        let final_numbers = round.drawn.as_slice().to_vec();
        let outcome = round.outcome();

        self.events.publish(
            room_id,
            Event::RoundOver {
                winner,
                reason,
                final_numbers,
                duration_seconds: outcome.as_ref().map_or(0, |o| o.duration_seconds),
            },
        );
        info!(%round_id, %room_id, %reason, ?winner, "round ended");

        let Some(outcome) = outcome else {
            return Ok(true);
        };
        match self.store.finish_round(round_id, &outcome).await {
            Ok(()) => self.schedule_eviction(timers, round_id),
            Err(e) => {
                error!(%round_id, error = %e, "failed to persist round outcome, will retry");
                if let Some(round) = self.rounds.get_mut(&round_id) {
                    round.persist_pending = true;
                }
            }
        }
        Ok(true)
    }

    /// Retries the final store write of a round flagged `persist_pending`.
    pub async fn retry_finalize(
        &mut self,
        timers: &mut Timers,
        round_id: RoundId,
    ) -> Result<bool, RoundError> {
        let round = self
            .rounds
            .get(&round_id)
            .ok_or(RoundError::NotFound(round_id))?;
        if !round.persist_pending {
            return Ok(false);
        }
        let Some(outcome) = round.outcome() else {
            return Ok(false);
        };
        self.store.finish_round(round_id, &outcome).await?;

        if let Some(round) = self.rounds.get_mut(&round_id) {
            round.persist_pending = false;
        }
        info!(%round_id, "round outcome persisted on retry");
        self.schedule_eviction(timers, round_id);
        Ok(true)
    }

    fn schedule_eviction(&mut self, timers: &mut Timers, round_id: RoundId) {
        let retention = self.config.retention;
        if !timers.register_once(TimerKey::Evict(round_id), retention, Instant::now()) {
            warn!(%round_id, "eviction not scheduled, monitor will evict");
        }
    }

    /// How long terminal rounds stay readable.
    pub fn retention(&self) -> Duration {
        self.config.retention
    }

    /// Drops a terminal round from memory. Rounds still waiting on their
    /// final write or on refunds are kept.
    pub fn evict(&mut self, timers: &mut Timers, round_id: RoundId) -> bool {
        match self.rounds.get(&round_id) {
            Some(round)
                if round.status.is_terminal()
                    && !round.persist_pending
                    && !round.refunds_pending() => {}
            _ => return false,
        }
        timers.unregister(&TimerKey::Evict(round_id));
        self.rounds.remove(&round_id);
        debug!(%round_id, "round evicted");
        true
    }

    /// Records that a participant's stake was returned. Returns `false` if
    /// it already was.
    pub fn mark_refunded(&mut self, round_id: RoundId, participant_id: ParticipantId) -> bool {
        match self
            .rounds
            .get_mut(&round_id)
            .and_then(|r| r.participant_mut(participant_id))
        {
            Some(p) if !p.refunded => {
                p.refunded = true;
                true
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Timer dispatch
    // -----------------------------------------------------------------------

    /// Handles a due round timer. Room timers are ignored.
    pub async fn on_timer(&mut self, timers: &mut Timers, key: TimerKey) -> Result<(), RoundError> {
        match key {
            TimerKey::Draw(round_id) => self.draw(timers, round_id).await.map(|_| ()),
            TimerKey::Reconnect(round_id, participant_id) => {
                self.expire_participant(timers, round_id, participant_id)
                    .await
            }
            TimerKey::Evict(round_id) => {
                self.evict(timers, round_id);
                Ok(())
            }
            TimerKey::Wait(_) | TimerKey::Countdown(_) => Ok(()),
        }
    }
}
