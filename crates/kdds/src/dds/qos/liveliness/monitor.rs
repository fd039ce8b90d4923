// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

use super::{Liveliness, LivelinessKind};
use std::time::Duration;

use crate::core::types::{duration_to_nanos, MonoTime};

/// Writer-side liveliness monitor: tracks the last renewal against the
/// lease and reports alive/not-alive transitions.
///
/// Deadlines are evaluated against the caller-supplied monotonic clock so
/// the matching engine and tests can drive time explicitly.
#[derive(Debug)]
pub struct LivelinessMonitor {
    kind: LivelinessKind,
    lease_nanos: i64,
    last_renewal: MonoTime,
    alive: bool,
}

impl LivelinessMonitor {
    #[must_use]
    pub fn new(policy: &Liveliness, now: MonoTime) -> Self {
        Self {
            kind: policy.kind,
            lease_nanos: if policy.is_infinite() {
                i64::MAX
            } else {
                duration_to_nanos(policy.lease_duration)
            },
            last_renewal: now,
            alive: true,
        }
    }

    /// Renew the lease. Returns `true` when this flips not-alive -> alive.
    pub fn renew(&mut self, now: MonoTime) -> bool {
        self.last_renewal = now;
        let was_dead = !self.alive;
        self.alive = true;
        was_dead
    }

    /// Evaluate expiry. Returns `true` when this flips alive -> not-alive.
    pub fn check_expired(&mut self, now: MonoTime) -> bool {
        if self.lease_nanos == i64::MAX || !self.alive {
            return false;
        }
        if now.saturating_sub(self.last_renewal) > self.lease_nanos {
            self.alive = false;
            return true;
        }
        false
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    #[must_use]
    pub fn kind(&self) -> LivelinessKind {
        self.kind
    }

    #[must_use]
    pub fn lease_nanos(&self) -> i64 {
        self.lease_nanos
    }

    /// Absolute deadline of the current lease (`None` when infinite).
    #[must_use]
    pub fn deadline(&self) -> Option<MonoTime> {
        if self.lease_nanos == i64::MAX {
            None
        } else {
            Some(self.last_renewal.saturating_add(self.lease_nanos))
        }
    }
}

/// Convenience: lease for a policy, expressed as a `Duration`.
#[must_use]
pub fn lease_of(policy: &Liveliness) -> Duration {
    policy.lease_duration
}
