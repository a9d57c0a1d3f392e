//! The timer table: many logical timers, one clock.
//!
//! A [`TimerScheduler`] owns one [`Registration`] per key (a round's draw
//! cadence, a room's countdown, a participant's grace deadline, …). It never
//! sleeps. The engine calls [`TimerScheduler::tick`] on every master clock
//! tick, gets back the keys that are due, and dispatches them itself.
//!
//! The cost is an O(live registrations) scan per tick, which is why the
//! table has a hard ceiling: registrations past it are refused, never
//! silently dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{PressureProbe, TimerConfig};

/// One row of the timer table.
#[derive(Debug, Clone)]
pub struct Registration {
    pub interval: Duration,
    pub next_due: Instant,
    pub active: bool,
    /// One-shot entries are removed when they fire.
    pub once: bool,
    /// Last time the entry fired or its owner reported activity.
    pub last_active: Instant,
}

/// Multiplexes per-key timers onto the single master clock.
///
/// `K` is whatever the caller uses to tell timers apart. It must be `Ord`
/// so that keys due on the same tick are returned in a stable order.
pub struct TimerScheduler<K> {
    entries: BTreeMap<K, Registration>,
    config: TimerConfig,
    ticks: u64,
    total_fired: u64,
}

impl<K> TimerScheduler<K>
where
    K: Copy + Ord + fmt::Debug,
{
    pub fn new(config: TimerConfig) -> Self {
        let config = config.validated();
        debug!(
            ceiling = config.max_registrations,
            tick_ms = config.tick_period_ms,
            "timer scheduler created"
        );
        Self {
            entries: BTreeMap::new(),
            config,
            ticks: 0,
            total_fired: 0,
        }
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// The registration ceiling.
    pub fn capacity(&self) -> usize {
        self.config.max_registrations
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether one more *new* key would be accepted.
    pub fn has_capacity(&self) -> bool {
        self.entries.len() < self.config.max_registrations
    }

    /// Registers a repeating timer first due at `now + interval`.
    ///
    /// Returns `false` if the key is new and the table is at its ceiling.
    /// Re-registering an existing key replaces it and always succeeds.
    pub fn register(&mut self, key: K, interval: Duration, now: Instant) -> bool {
        self.insert(key, interval, now, false)
    }

    /// Registers a one-shot timer due at `now + delay`.
    pub fn register_once(&mut self, key: K, delay: Duration, now: Instant) -> bool {
        self.insert(key, delay, now, true)
    }

    fn insert(&mut self, key: K, interval: Duration, now: Instant, once: bool) -> bool {
        if !self.entries.contains_key(&key) && !self.has_capacity() {
            warn!(
                ?key,
                ceiling = self.config.max_registrations,
                "timer registration rejected: scheduler at capacity"
            );
            return false;
        }
        self.entries.insert(
            key,
            Registration {
                interval,
                next_due: now + interval,
                active: true,
                once,
                last_active: now,
            },
        );
        debug!(?key, interval_ms = interval.as_millis() as u64, once, "timer registered");
        true
    }

    /// Removes a key. Returns `true` if it was registered.
    pub fn unregister(&mut self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            debug!(?key, "timer unregistered");
        }
        removed
    }

    /// Stops a key from firing without giving up its slot.
    pub fn pause(&mut self, key: &K) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.active = false;
                true
            }
            None => false,
        }
    }

    /// Re-arms a paused key one interval from `now`.
    pub fn resume(&mut self, key: &K, now: Instant) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                if !entry.active {
                    entry.active = true;
                    entry.next_due = now + entry.interval;
                }
                true
            }
            None => false,
        }
    }

    /// Marks a key's owner as recently active (affects shedding order).
    pub fn touch(&mut self, key: &K, now: Instant) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_active = now;
        }
    }

    pub fn is_registered(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_active(&self, key: &K) -> bool {
        self.entries.get(key).is_some_and(|e| e.active)
    }

    pub fn get(&self, key: &K) -> Option<&Registration> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Scans the table and returns every active key with `now >= next_due`.
    ///
    /// Repeating keys are re-armed at `now + interval`; one-shot keys are
    /// removed. Keys come back ordered by due time, then by key.
    pub fn tick(&mut self, now: Instant) -> Vec<K> {
        self.ticks += 1;

        let mut due: Vec<(Instant, K)> = self
            .entries
            .iter()
            .filter(|(_, e)| e.active && now >= e.next_due)
            .map(|(k, e)| (e.next_due, *k))
            .collect();
        due.sort();

        let mut fired = Vec::with_capacity(due.len());
        for (_, key) in due {
            let Some(entry) = self.entries.get_mut(&key) else {
                continue;
            };
            if entry.once {
                self.entries.remove(&key);
            } else {
                entry.next_due = now + entry.interval;
                entry.last_active = now;
            }
            fired.push(key);
        }
        self.total_fired += fired.len() as u64;
        fired
    }

    /// Drops a key whose handler failed so it cannot stall the clock again.
    pub fn fail(&mut self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            warn!(?key, "timer handler failed, registration dropped");
        }
        removed
    }

    /// Whether this tick is one on which host pressure should be sampled.
    pub fn pressure_sample_due(&self) -> bool {
        self.config.pressure_sample_every > 0
            && self.ticks > 0
            && self.ticks % self.config.pressure_sample_every == 0
    }

    /// Samples `probe` and, above the threshold, sheds the least-recently
    /// active half of the keys accepted by `eligible`.
    ///
    /// Returns the shed keys so the caller can end whatever they owned.
    pub fn shed_if_pressured<F>(&mut self, probe: &mut dyn PressureProbe, eligible: F) -> Vec<K>
    where
        F: Fn(&K) -> bool,
    {
        let Some(pressure) = probe.sample() else {
            return Vec::new();
        };
        if pressure <= self.config.pressure_threshold {
            return Vec::new();
        }

        let mut candidates: Vec<(Instant, K)> = self
            .entries
            .iter()
            .filter(|(k, _)| eligible(k))
            .map(|(k, e)| (e.last_active, *k))
            .collect();
        candidates.sort();
        let shed_count = candidates.len().div_ceil(2);

        let shed: Vec<K> = candidates
            .into_iter()
            .take(shed_count)
            .map(|(_, k)| k)
            .collect();
        for key in &shed {
            self.entries.remove(key);
        }
        if !shed.is_empty() {
            info!(
                pressure,
                threshold = self.config.pressure_threshold,
                shed = shed.len(),
                "host pressure above threshold, shedding least-recently-active timers"
            );
        }
        shed
    }

    /// Total ticks scanned and total keys fired since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.ticks, self.total_fired)
    }
}
