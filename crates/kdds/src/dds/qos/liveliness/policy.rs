// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

use super::LivelinessKind;
use std::time::Duration;

/// LIVELINESS QoS policy.
///
/// Degenerate lease durations (0 ns, 1 ns) are permitted: the writer is
/// then alive only for the instant of a write, toggling at least once per
/// write batch at every matched reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveliness {
    pub kind: LivelinessKind,
    pub lease_duration: Duration,
}

impl Default for Liveliness {
    fn default() -> Self {
        Self {
            kind: LivelinessKind::Automatic,
            lease_duration: Duration::from_secs(u64::MAX),
        }
    }
}

impl Liveliness {
    #[must_use]
    pub fn new(kind: LivelinessKind, lease_duration: Duration) -> Self {
        Self {
            kind,
            lease_duration,
        }
    }

    #[must_use]
    pub fn automatic(lease_duration: Duration) -> Self {
        Self::new(LivelinessKind::Automatic, lease_duration)
    }

    #[must_use]
    pub fn manual_by_participant(lease_duration: Duration) -> Self {
        Self::new(LivelinessKind::ManualByParticipant, lease_duration)
    }

    #[must_use]
    pub fn manual_by_topic(lease_duration: Duration) -> Self {
        Self::new(LivelinessKind::ManualByTopic, lease_duration)
    }

    #[must_use]
    pub fn infinite() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_infinite(&self) -> bool {
        self.lease_duration == Duration::from_secs(u64::MAX)
    }

    /// Offered (writer) must be at least as strong as requested (reader):
    /// stronger kind, and a lease no longer than the reader expects.
    #[must_use]
    pub fn is_compatible_with(&self, requested: &Liveliness) -> bool {
        self.kind >= requested.kind && self.lease_duration <= requested.lease_duration
    }
}
