// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Liveliness lease tracking.
//!
//! Reader side: every matched writer carries a lease (last renewal + lease
//! duration); expiry flips alive -> not-alive and emits
//! `liveliness_changed` with `alive_count_change = -1`, a later renewal
//! flips back with `+1`. The match itself survives the transition.
//!
//! Writer side: the participant tracks its writers' kinds and leases,
//! derives the PMD interval (`min(lease) * 0.8` with a floor), and detects
//! manual writers missing their own lease (`liveliness_lost`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::types::{duration_to_nanos, Guid, MonoTime};
use crate::dds::qos::liveliness::LivelinessMonitor;
use crate::dds::{Liveliness, LivelinessKind, StatusRegistry};

// ============================================================================
// Reader side
// ============================================================================

struct Lease {
    kind: LivelinessKind,
    lease_nanos: i64,
    deadline: MonoTime,
    alive: bool,
}

impl Lease {
    fn new(policy: &Liveliness, now: MonoTime) -> Self {
        let lease_nanos = if policy.is_infinite() {
            i64::MAX
        } else {
            duration_to_nanos(policy.lease_duration)
        };
        Self {
            kind: policy.kind,
            lease_nanos,
            deadline: now.saturating_add(lease_nanos),
            alive: true,
        }
    }
}

/// Reader-side lease registry: one lease per matched writer.
pub struct LeaseRegistry {
    status: Arc<StatusRegistry>,
    leases: Mutex<HashMap<Guid, Lease>>,
}

impl LeaseRegistry {
    #[must_use]
    pub fn new(status: Arc<StatusRegistry>) -> Self {
        Self {
            status,
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// A writer matched: starts alive, lease running.
    pub fn add_writer(&self, writer: Guid, policy: &Liveliness, now: MonoTime) {
        let mut leases = self.leases.lock();
        if leases.insert(writer, Lease::new(policy, now)).is_none() {
            drop(leases);
            self.status.push_liveliness_changed(1, 0, writer);
        }
    }

    /// A writer unmatched (deleted). Adjusts whichever count it occupied.
    pub fn remove_writer(&self, writer: &Guid) {
        let removed = self.leases.lock().remove(writer);
        if let Some(lease) = removed {
            if lease.alive {
                self.status.push_liveliness_changed(-1, 0, *writer);
            } else {
                self.status.push_liveliness_changed(0, -1, *writer);
            }
        }
    }

    /// Renew one writer's lease (data arrival or liveliness assertion).
    pub fn renew(&self, writer: &Guid, now: MonoTime) {
        let regained = {
            let mut leases = self.leases.lock();
            let Some(lease) = leases.get_mut(writer) else {
                return;
            };
            lease.deadline = now.saturating_add(lease.lease_nanos);
            let regained = !lease.alive;
            lease.alive = true;
            regained
        };
        if regained {
            self.status.push_liveliness_changed(1, -1, *writer);
        }
    }

    /// Renew every lease of the given participant prefix whose kind the
    /// PMD kind covers (AUTOMATIC PMD renews automatic writers, MANUAL PMD
    /// renews manual-by-participant writers).
    pub fn renew_by_prefix(&self, prefix: &[u8; 12], kind: LivelinessKind, now: MonoTime) {
        let regained: Vec<Guid> = {
            let mut leases = self.leases.lock();
            leases
                .iter_mut()
                .filter(|(guid, lease)| guid.prefix == *prefix && lease.kind == kind)
                .filter_map(|(guid, lease)| {
                    lease.deadline = now.saturating_add(lease.lease_nanos);
                    let regained = !lease.alive;
                    lease.alive = true;
                    regained.then_some(*guid)
                })
                .collect()
        };
        for writer in regained {
            self.status.push_liveliness_changed(1, -1, writer);
        }
    }

    /// Expire overdue leases. Returns the writers that just went
    /// not-alive (their instances turn NOT_ALIVE_NO_WRITERS upstream).
    pub fn check_expired(&self, now: MonoTime) -> Vec<Guid> {
        let expired: Vec<Guid> = {
            let mut leases = self.leases.lock();
            leases
                .iter_mut()
                .filter(|(_, lease)| {
                    lease.alive && lease.lease_nanos != i64::MAX && now > lease.deadline
                })
                .map(|(guid, lease)| {
                    lease.alive = false;
                    *guid
                })
                .collect()
        };
        for writer in &expired {
            self.status.push_liveliness_changed(-1, 1, *writer);
        }
        expired
    }

    /// Earliest pending expiry (for scheduling the next check).
    #[must_use]
    pub fn next_deadline(&self) -> Option<MonoTime> {
        self.leases
            .lock()
            .values()
            .filter(|l| l.alive && l.lease_nanos != i64::MAX)
            .map(|l| l.deadline)
            .min()
    }

    #[must_use]
    pub fn is_alive(&self, writer: &Guid) -> Option<bool> {
        self.leases.lock().get(writer).map(|l| l.alive)
    }

    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.leases.lock().values().filter(|l| l.alive).count()
    }
}

// ============================================================================
// Writer side
// ============================================================================

struct WriterLiveliness {
    policy: Liveliness,
    monitor: LivelinessMonitor,
    /// Set once `liveliness_lost` fired for the current outage.
    lost_reported: bool,
}

/// Participant-level liveliness state over its owned writers.
pub struct ParticipantLiveliness {
    writers: Mutex<HashMap<Guid, WriterLiveliness>>,
    pmd_floor: Duration,
}

/// PMD interval derating factor: assert comfortably inside the lease.
const PMD_LEASE_FACTOR: f64 = 0.8;

impl ParticipantLiveliness {
    #[must_use]
    pub fn new(pmd_floor: Duration) -> Self {
        Self {
            writers: Mutex::new(HashMap::new()),
            pmd_floor,
        }
    }

    pub fn add_writer(&self, writer: Guid, policy: &Liveliness, now: MonoTime) {
        self.writers.lock().insert(
            writer,
            WriterLiveliness {
                policy: *policy,
                monitor: LivelinessMonitor::new(policy, now),
                lost_reported: false,
            },
        );
    }

    pub fn remove_writer(&self, writer: &Guid) {
        self.writers.lock().remove(writer);
    }

    /// PMD emission interval: `min(lease over automatic writers) * 0.8`,
    /// floored. `None` when no automatic writer has a finite lease.
    #[must_use]
    pub fn pmd_interval(&self) -> Option<Duration> {
        let writers = self.writers.lock();
        let min_lease = writers
            .values()
            .filter(|w| w.policy.kind == LivelinessKind::Automatic && !w.policy.is_infinite())
            .map(|w| w.policy.lease_duration)
            .min()?;
        let derated = min_lease.mul_f64(PMD_LEASE_FACTOR);
        Some(derated.max(self.pmd_floor))
    }

    /// Automatic PMD tick: renews every automatic writer. Returns their
    /// GUIDs so the caller fans the renewal out to matched readers.
    pub fn automatic_tick(&self, now: MonoTime) -> Vec<Guid> {
        let mut writers = self.writers.lock();
        writers
            .iter_mut()
            .filter(|(_, w)| w.policy.kind == LivelinessKind::Automatic)
            .map(|(guid, w)| {
                w.monitor.renew(now);
                w.lost_reported = false;
                *guid
            })
            .collect()
    }

    /// `assert_liveliness` on the participant: renews every
    /// manual-by-participant writer.
    pub fn assert_participant(&self, now: MonoTime) -> Vec<Guid> {
        let mut writers = self.writers.lock();
        writers
            .iter_mut()
            .filter(|(_, w)| w.policy.kind == LivelinessKind::ManualByParticipant)
            .map(|(guid, w)| {
                w.monitor.renew(now);
                w.lost_reported = false;
                *guid
            })
            .collect()
    }

    /// A write or `assert_liveliness` on one writer renews exactly it.
    /// Returns `false` for an unknown writer.
    pub fn assert_writer(&self, writer: &Guid, now: MonoTime) -> bool {
        let mut writers = self.writers.lock();
        match writers.get_mut(writer) {
            Some(w) => {
                w.monitor.renew(now);
                w.lost_reported = false;
                true
            }
            None => false,
        }
    }

    /// Manual writers whose own lease elapsed without renewal; each is
    /// reported once per outage (`liveliness_lost`).
    pub fn check_lost(&self, now: MonoTime) -> Vec<Guid> {
        let mut writers = self.writers.lock();
        writers
            .iter_mut()
            .filter(|(_, w)| w.policy.kind != LivelinessKind::Automatic && !w.lost_reported)
            .filter_map(|(guid, w)| {
                if w.monitor.check_expired(now) || !w.monitor.is_alive() {
                    w.lost_reported = true;
                    Some(*guid)
                } else {
                    None
                }
            })
            .collect()
    }
}
