// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Reader-side reliable-delivery state machine, one instance per matched
//! proxy writer.
//!
//! Combines the reorder buffer and defragmenter with ACKNACK policy:
//! heartbeat-driven responses are rate-limited, and until the first
//! heartbeat arrives a pre-emptive ACKNACK stream solicits the writer's
//! state at a decaying frequency (1 s, then 2 s, 5 s, 10 s at the
//! 10/60/120-second marks, stopping after five minutes).

use super::ReliabilityConfig;
use crate::core::data::SampleData;
use crate::core::types::{duration_to_nanos, Guid, MonoTime, SequenceNumber, Timestamp};
use crate::frag::{Defrag, Reorder, ReorderMode, ReorderOutcome};
use crate::protocol::{DataFrag, Gap, Heartbeat, SequenceNumberSet, MAX_BITMAP_BITS};

/// ACKNACK the delivery engine should put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknackPlan {
    pub set: SequenceNumberSet,
    pub count: u32,
    /// FINAL set on a pure acknowledgment (nothing requested).
    pub final_flag: bool,
}

/// Everything a heartbeat may cause.
#[derive(Debug, Default)]
pub struct HeartbeatReaction {
    /// Buffered samples released by advancing past unavailable sequences.
    pub deliver: Vec<(SequenceNumber, SampleData)>,
    /// Sequences given up on (below the writer's first available).
    pub lost: u64,
    pub acknack: Option<AcknackPlan>,
}

/// Pre-emptive ACKNACK decay: interval for a given elapsed time, `None`
/// once the stream should stop.
fn preemptive_interval(elapsed: i64) -> Option<i64> {
    const SEC: i64 = 1_000_000_000;
    if elapsed < 10 * SEC {
        Some(SEC)
    } else if elapsed < 60 * SEC {
        Some(2 * SEC)
    } else if elapsed < 120 * SEC {
        Some(5 * SEC)
    } else if elapsed < 300 * SEC {
        Some(10 * SEC)
    } else {
        None
    }
}

/// Per-proxy-writer reliability state.
pub struct ProxyWriterState {
    guid: Guid,
    cfg: ReliabilityConfig,
    reorder: Reorder,
    defrag: Defrag,
    last_seq_seen: SequenceNumber,
    have_seen_heartbeat: bool,
    last_hb_count: u32,
    acknack_count: u32,
    /// Source timestamp of the last heartbeat, for latency estimation.
    hb_timestamp: Option<Timestamp>,
    t_last_nack: Option<MonoTime>,
    seq_last_nack: SequenceNumber,
    preemptive_start: MonoTime,
    preemptive_next: MonoTime,
}

impl ProxyWriterState {
    #[must_use]
    pub fn new(
        guid: Guid,
        cfg: ReliabilityConfig,
        mode: ReorderMode,
        max_reorder_samples: usize,
        now: MonoTime,
    ) -> Self {
        Self {
            guid,
            cfg,
            reorder: Reorder::new(mode, max_reorder_samples),
            defrag: Defrag::default(),
            last_seq_seen: 0,
            have_seen_heartbeat: false,
            last_hb_count: 0,
            acknack_count: 0,
            hb_timestamp: None,
            t_last_nack: None,
            seq_last_nack: 0,
            preemptive_start: now,
            preemptive_next: now,
        }
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    #[must_use]
    pub fn next_seq(&self) -> SequenceNumber {
        self.reorder.next_seq()
    }

    #[must_use]
    pub fn last_seq_seen(&self) -> SequenceNumber {
        self.last_seq_seen
    }

    #[must_use]
    pub fn have_seen_heartbeat(&self) -> bool {
        self.have_seen_heartbeat
    }

    #[must_use]
    pub fn acknack_count(&self) -> u32 {
        self.acknack_count
    }

    /// Base of the most recent ACKNACK sent (diagnostics).
    #[must_use]
    pub fn seq_last_nack(&self) -> SequenceNumber {
        self.seq_last_nack
    }

    #[must_use]
    pub fn hb_timestamp(&self) -> Option<Timestamp> {
        self.hb_timestamp
    }

    /// Offer a complete (defragmented) sample to the reorder buffer.
    pub fn on_data(&mut self, seq: SequenceNumber, data: SampleData) -> ReorderOutcome {
        if seq > self.last_seq_seen {
            self.last_seq_seen = seq;
        }
        self.reorder.insert(seq, data)
    }

    /// Merge a DATA_FRAG; returns the reassembled payload when complete.
    pub fn on_datafrag(&mut self, frag: &DataFrag) -> Option<Vec<u8>> {
        if frag.seq > self.last_seq_seen {
            self.last_seq_seen = frag.seq;
        }
        self.defrag.insert(frag)
    }

    /// Build the NACK_FRAG bitmap for a partially received sample.
    pub fn nack_frag_map(
        &mut self,
        seq: SequenceNumber,
        max_frag: u32,
        max_bits: u32,
    ) -> crate::protocol::FragmentNumberSet {
        self.defrag.nack_map(seq, max_frag, max_bits)
    }

    /// Apply a GAP submessage.
    pub fn on_gap(&mut self, gap: &Gap) -> Vec<(SequenceNumber, SampleData)> {
        let hi = gap.gap_list.base();
        if hi - 1 > self.last_seq_seen {
            self.last_seq_seen = hi - 1;
        }
        // Any fragment state for gapped sequences is garbage now.
        for seq in gap.gap_start..hi {
            self.defrag.drop_sample(seq);
        }
        for seq in gap.gap_list.iter() {
            self.defrag.drop_sample(seq);
        }
        self.reorder.gap(gap.gap_start, hi, &gap.gap_list)
    }

    /// Process a heartbeat.
    ///
    /// `queue_full` sets the notail flag: the ACKNACK will not extend past
    /// the first hole, so a congested reader does not ask for data it
    /// cannot yet ingest.
    pub fn on_heartbeat(
        &mut self,
        hb: &Heartbeat,
        now: MonoTime,
        source_ts: Option<Timestamp>,
        queue_full: bool,
    ) -> HeartbeatReaction {
        let mut reaction = HeartbeatReaction::default();

        if hb.count <= self.last_hb_count && self.last_hb_count > 0 {
            return reaction;
        }
        self.last_hb_count = hb.count;
        self.have_seen_heartbeat = true;
        self.hb_timestamp = source_ts;
        if hb.last_seq > self.last_seq_seen {
            self.last_seq_seen = hb.last_seq;
        }

        // Sequences below the writer's first available will never arrive.
        let next = self.reorder.next_seq();
        if hb.first_seq > next {
            let batch = self
                .reorder
                .gap(next, hb.first_seq, &SequenceNumberSet::new(hb.first_seq));
            let recovered = batch.iter().filter(|(s, _)| *s < hb.first_seq).count() as u64;
            reaction.lost = (hb.first_seq - next) as u64 - recovered;
            reaction.deliver = batch;
        }

        // Rate limit: at most one ACKNACK per heartbeat within the
        // configured delay.
        let delay = duration_to_nanos(self.cfg.auto_resched_nack_delay);
        if self
            .t_last_nack
            .is_some_and(|t| now.saturating_sub(t) < delay)
        {
            return reaction;
        }

        let set = self
            .reorder
            .nack_map(hb.last_seq, MAX_BITMAP_BITS, queue_full);
        let synchronized = set.is_empty();
        if synchronized && hb.final_flag {
            // Nothing missing and no response solicited.
            return reaction;
        }

        self.acknack_count += 1;
        self.t_last_nack = Some(now);
        self.seq_last_nack = set.base();
        reaction.acknack = Some(AcknackPlan {
            set,
            count: self.acknack_count,
            final_flag: synchronized,
        });
        reaction
    }

    /// Drive the pre-emptive ACKNACK stream.
    ///
    /// Active only until the first heartbeat arrives; emits at the decay
    /// schedule and goes quiet after five minutes.
    pub fn preemptive_tick(&mut self, now: MonoTime) -> Option<AcknackPlan> {
        if self.have_seen_heartbeat || now < self.preemptive_next {
            return None;
        }
        let elapsed = now.saturating_sub(self.preemptive_start);
        let interval = preemptive_interval(elapsed)?;
        self.preemptive_next = now.saturating_add(interval);

        self.acknack_count += 1;
        Some(AcknackPlan {
            set: SequenceNumberSet::new(self.reorder.next_seq()),
            count: self.acknack_count,
            final_flag: false,
        })
    }
}
