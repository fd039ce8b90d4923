// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Reliable-delivery state machines.
//!
//! One [`ReliableWriter`] per writer tracks every matched reader's
//! acknowledgment state and schedules heartbeats; one [`ProxyWriterState`]
//! per (reader, matched writer) pair drives defragmentation, reordering
//! and the ACKNACK/NACK_FRAG protocol. Retransmissions flow through the
//! capped [`RetransmitQueue`].

mod reader;
mod rexmit;
mod writer;

use std::time::Duration;

pub use reader::{AcknackPlan, HeartbeatReaction, ProxyWriterState};
pub use rexmit::{RetransmitQueue, RexmitConfig, RexmitPush, RexmitSample};
pub use writer::{AcknackReaction, HeartbeatPlan, MatchedReaderState, ReliableWriter};

/// Tunables for the reliability protocol.
#[derive(Debug, Clone)]
pub struct ReliabilityConfig {
    /// Lower bound on the standalone heartbeat interval.
    pub hb_interval_min: Duration,
    /// Upper bound reached when every reader is idle and acknowledged.
    pub hb_interval_max: Duration,
    /// Unacknowledged-bytes level above which heartbeats run at the
    /// minimum interval.
    pub hb_high_watermark_bytes: usize,
    /// Minimum interval between ACKNACK responses from one reader.
    pub auto_resched_nack_delay: Duration,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            hb_interval_min: Duration::from_millis(100),
            hb_interval_max: Duration::from_secs(8),
            hb_high_watermark_bytes: 128 * 1024,
            auto_resched_nack_delay: Duration::from_secs(1),
        }
    }
}

impl ReliabilityConfig {
    #[must_use]
    pub fn with_hb_interval_min(mut self, interval: Duration) -> Self {
        self.hb_interval_min = interval;
        self
    }

    #[must_use]
    pub fn with_auto_resched_nack_delay(mut self, delay: Duration) -> Self {
        self.auto_resched_nack_delay = delay;
        self
    }
}
