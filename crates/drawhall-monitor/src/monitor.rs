//! The lifecycle monitor: periodic housekeeping over every round.
//!
//! Idle timeout is advisory polling, not a deadline. The engine calls
//! [`LifecycleMonitor::poll`] on every master tick and a scan runs once the
//! scan interval has elapsed. Each scan:
//!
//! 1. expires disconnected participants whose deadline passed without a
//!    timer firing
//! 2. ends rounds idle past the threshold and cancels their rooms
//! 3. refunds every stake still owed, one participant at a time
//! 4. retries final writes that failed
//! 5. evicts terminal rounds whose retention elapsed without eviction
//!
//! A participant's refund flag is set only after the store accepted the
//! refund, so repeated scans never refund twice and a failure for one
//! participant never blocks the others.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use drawhall_protocol::{EndReason, ParticipantId, RoomId, RoundId};
use drawhall_round::{RoundCoordinator, TimerKey, Timers};
use drawhall_store::{AuditAction, AuditEntry, RoundStore};

use crate::MonitorConfig;

/// What one scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub expired_participants: usize,
    pub idle_ended: Vec<RoundId>,
    pub rooms_cancelled: Vec<RoomId>,
    pub refunded: Vec<(RoundId, ParticipantId)>,
    pub refund_failures: Vec<(RoundId, ParticipantId)>,
    pub finalized: Vec<RoundId>,
    pub finalize_failures: Vec<RoundId>,
    pub evicted: Vec<RoundId>,
}

impl ScanReport {
    /// True if the scan changed nothing and hit no failures.
    pub fn is_quiet(&self) -> bool {
        self.expired_participants == 0
            && self.idle_ended.is_empty()
            && self.rooms_cancelled.is_empty()
            && self.refunded.is_empty()
            && self.refund_failures.is_empty()
            && self.finalized.is_empty()
            && self.finalize_failures.is_empty()
            && self.evicted.is_empty()
    }
}

pub struct LifecycleMonitor {
    config: MonitorConfig,
    interval: Duration,
    running: bool,
    next_scan: Option<Instant>,
    /// Rooms of idle rounds the store has not yet marked cancelled.
    pending_cancels: BTreeMap<RoomId, RoundId>,
    scans: u64,
}

impl LifecycleMonitor {
    /// Creates a stopped monitor.
    pub fn new(config: MonitorConfig) -> Self {
        let interval = config.scan_interval;
        Self {
            config,
            interval,
            running: false,
            next_scan: None,
            pending_cancels: BTreeMap::new(),
            scans: 0,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Starts scanning every `interval`, first one `interval` from now.
    /// Restarting replaces the interval.
    pub fn start(&mut self, interval: Duration) {
        let interval = if interval.is_zero() {
            warn!("monitor interval of zero, using the configured interval");
            self.config.scan_interval.max(Duration::from_millis(1))
        } else {
            interval
        };
        self.interval = interval;
        self.running = true;
        self.next_scan = Some(Instant::now() + interval);
        info!(interval_ms = interval.as_millis() as u64, "lifecycle monitor started");
    }

    pub fn stop(&mut self) {
        if self.running {
            self.running = false;
            self.next_scan = None;
            info!(scans = self.scans, "lifecycle monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of scans run so far.
    pub fn scans(&self) -> u64 {
        self.scans
    }

    /// Runs a scan if one is due.
    pub async fn poll<S: RoundStore>(
        &mut self,
        timers: &mut Timers,
        rounds: &mut RoundCoordinator<S>,
        now: Instant,
    ) -> Option<ScanReport> {
        let due = self.next_scan.filter(|_| self.running)?;
        if now < due {
            return None;
        }
        self.next_scan = Some(now + self.interval);
        Some(self.scan(timers, rounds, now).await)
    }

    /// Runs one scan immediately, whether or not the monitor is running.
    pub async fn scan<S: RoundStore>(
        &mut self,
        timers: &mut Timers,
        rounds: &mut RoundCoordinator<S>,
        now: Instant,
    ) -> ScanReport {
        self.scans += 1;
        let store = Arc::clone(rounds.store());
        let mut report = ScanReport {
            expired_participants: rounds.expire_overdue(timers, now).await,
            ..ScanReport::default()
        };

        self.end_idle(timers, rounds, now, &mut report).await;
        self.cancel_rooms(store.as_ref(), &mut report).await;
        refund_stakes(rounds, store.as_ref(), &mut report).await;
        retry_finalize(timers, rounds, &mut report).await;
        evict_expired(timers, rounds, now, &mut report);

        if report.is_quiet() {
            debug!(scan = self.scans, "monitor scan: nothing to do");
        } else {
            info!(
                scan = self.scans,
                expired = report.expired_participants,
                idle_ended = report.idle_ended.len(),
                refunded = report.refunded.len(),
                refund_failures = report.refund_failures.len(),
                evicted = report.evicted.len(),
                "monitor scan"
            );
        }
        report
    }

    async fn end_idle<S: RoundStore>(
        &mut self,
        timers: &mut Timers,
        rounds: &mut RoundCoordinator<S>,
        now: Instant,
        report: &mut ScanReport,
    ) {
        let timeout = self.config.idle_timeout;
        let idle: Vec<(RoundId, RoomId, Duration)> = rounds
            .rounds()
            .filter(|r| r.is_in_progress() && r.idle_for(now) >= timeout)
            .map(|r| (r.id, r.room_id, r.idle_for(now)))
            .collect();

        for (round_id, room_id, idle_for) in idle {
            match rounds
                .end(timers, round_id, None, EndReason::IdleTimeout)
                .await
            {
                Ok(true) => {
                    info!(%round_id, %room_id, idle_secs = idle_for.as_secs(), "idle round ended");
                    report.idle_ended.push(round_id);
                    self.pending_cancels.insert(room_id, round_id);
                }
                Ok(false) => {}
                Err(e) => warn!(%round_id, error = %e, "failed to end idle round"),
            }
        }
    }

    async fn cancel_rooms<S: RoundStore>(&mut self, store: &S, report: &mut ScanReport) {
        for (room_id, round_id) in std::mem::take(&mut self.pending_cancels) {
            match store.mark_room_cancelled(room_id).await {
                Ok(()) => {
                    report.rooms_cancelled.push(room_id);
                    let entry = AuditEntry::new(AuditAction::RoomCancelled, "idle_timeout")
                        .room(room_id)
                        .round(round_id);
                    audit(store, entry).await;
                }
                Err(e) => {
                    warn!(%room_id, %round_id, error = %e, "failed to mark room cancelled, will retry");
                    self.pending_cancels.insert(room_id, round_id);
                }
            }
        }
    }
}

async fn refund_stakes<S: RoundStore>(
    rounds: &mut RoundCoordinator<S>,
    store: &S,
    report: &mut ScanReport,
) {
    let owed: Vec<(RoundId, RoomId, ParticipantId, u64)> = rounds
        .rounds()
        .flat_map(|r| {
            r.refunds_due()
                .map(move |p| (r.id, r.room_id, p.id, p.stake))
        })
        .collect();

    for (round_id, room_id, participant_id, amount) in owed {
        match store.refund_stake(participant_id, round_id, amount).await {
            Ok(()) => {
                if rounds.mark_refunded(round_id, participant_id) {
                    info!(%round_id, %participant_id, amount, "stake refunded");
                    report.refunded.push((round_id, participant_id));
                    let entry = AuditEntry::new(AuditAction::StakeRefunded, amount.to_string())
                        .round(round_id)
                        .room(room_id)
                        .participant(participant_id);
                    audit(store, entry).await;
                }
            }
            Err(e) => {
                warn!(%round_id, %participant_id, amount, error = %e, "stake refund failed, will retry");
                report.refund_failures.push((round_id, participant_id));
                let entry = AuditEntry::new(AuditAction::RefundFailed, e.to_string())
                    .round(round_id)
                    .room(room_id)
                    .participant(participant_id);
                audit(store, entry).await;
            }
        }
    }
}

async fn retry_finalize<S: RoundStore>(
    timers: &mut Timers,
    rounds: &mut RoundCoordinator<S>,
    report: &mut ScanReport,
) {
    let pending: Vec<RoundId> = rounds
        .rounds()
        .filter(|r| r.persist_pending)
        .map(|r| r.id)
        .collect();

    for round_id in pending {
        match rounds.retry_finalize(timers, round_id).await {
            Ok(true) => report.finalized.push(round_id),
            Ok(false) => {}
            Err(e) => {
                warn!(%round_id, error = %e, "final write still failing");
                report.finalize_failures.push(round_id);
            }
        }
    }
}

/// Evicts terminal rounds past retention that have no eviction timer left.
fn evict_expired<S: RoundStore>(
    timers: &mut Timers,
    rounds: &mut RoundCoordinator<S>,
    now: Instant,
    report: &mut ScanReport,
) {
    let retention = rounds.retention();
    let stale: Vec<RoundId> = rounds
        .rounds()
        .filter(|r| {
            r.status.is_terminal()
                && r
                    .ended_at
                    .is_some_and(|t| now.saturating_duration_since(t) >= retention)
                && !timers.is_registered(&TimerKey::Evict(r.id))
        })
        .map(|r| r.id)
        .collect();

    for round_id in stale {
        if rounds.evict(timers, round_id) {
            report.evicted.push(round_id);
        }
    }
}

async fn audit<S: RoundStore>(store: &S, entry: AuditEntry) {
    if let Err(e) = store.record_audit(entry).await {
        warn!(error = %e, "failed to write audit entry");
    }
}
