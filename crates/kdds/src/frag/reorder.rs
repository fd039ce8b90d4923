// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Per-proxy-writer reorder buffer.
//!
//! Strict mode (reliable readers) delivers a sample only after every lower
//! sequence number has been delivered or explicitly gapped. Monotonic mode
//! (best-effort readers) delivers anything newer than the last delivery and
//! never buffers. A second instance per (proxy-writer, reader) carries
//! transient-local catch-up streams.

use std::collections::BTreeMap;

use crate::core::data::SampleData;
use crate::core::types::SequenceNumber;
use crate::protocol::{SequenceNumberSet, MAX_BITMAP_BITS};

/// Ordering discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderMode {
    /// Deliver only contiguous sequences (gaps must be filled or gapped).
    Strict,
    /// Deliver any sequence newer than the last delivered; never buffer.
    Monotonic,
}

/// Outcome of offering a sample to the reorder buffer.
#[derive(Debug)]
pub enum ReorderOutcome {
    /// The sample (and possibly buffered successors) are ready, in order.
    Deliver(Vec<(SequenceNumber, SampleData)>),
    /// Out of order; buffered until the hole closes.
    Buffered,
    /// Duplicate or already accounted for; dropped.
    Rejected,
    /// Buffer was full: the given buffered sequence was discarded to admit
    /// this one (KEEP_LAST sliding-window behavior).
    Replaced(SequenceNumber),
}

enum Slot {
    Sample(SampleData),
    /// Writer declared the sequence unavailable.
    Gapped,
}

/// Reorder buffer for one proxy writer.
pub struct Reorder {
    mode: ReorderMode,
    /// Lowest sequence not yet delivered or gapped.
    next_seq: SequenceNumber,
    pending: BTreeMap<SequenceNumber, Slot>,
    max_samples: usize,
}

impl Reorder {
    #[must_use]
    pub fn new(mode: ReorderMode, max_samples: usize) -> Self {
        Self {
            mode,
            next_seq: 1,
            pending: BTreeMap::new(),
            max_samples: max_samples.max(1),
        }
    }

    /// Lowest unseen sequence number.
    #[must_use]
    pub fn next_seq(&self) -> SequenceNumber {
        self.next_seq
    }

    /// Number of buffered out-of-order samples.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending
            .values()
            .filter(|s| matches!(s, Slot::Sample(_)))
            .count()
    }

    /// Offer a sample.
    pub fn insert(&mut self, seq: SequenceNumber, data: SampleData) -> ReorderOutcome {
        if seq < self.next_seq {
            return ReorderOutcome::Rejected;
        }

        if matches!(self.mode, ReorderMode::Monotonic) {
            // Best-effort: anything newer goes straight out.
            self.next_seq = seq + 1;
            return ReorderOutcome::Deliver(vec![(seq, data)]);
        }

        if seq == self.next_seq {
            let mut batch = vec![(seq, data)];
            self.next_seq += 1;
            self.drain_contiguous(&mut batch);
            return ReorderOutcome::Deliver(batch);
        }

        // Out of order.
        if self.pending.contains_key(&seq) {
            return ReorderOutcome::Rejected;
        }

        if self.pending.len() >= self.max_samples {
            // Sliding window: discard the highest buffered sequence if the
            // newcomer is older (closer to the hole), otherwise reject.
            let highest = self
                .pending
                .keys()
                .next_back()
                .copied()
                .unwrap_or(self.next_seq);
            if seq >= highest {
                return ReorderOutcome::Rejected;
            }
            self.pending.remove(&highest);
            self.pending.insert(seq, Slot::Sample(data));
            return ReorderOutcome::Replaced(highest);
        }

        self.pending.insert(seq, Slot::Sample(data));
        ReorderOutcome::Buffered
    }

    /// Apply a GAP: sequences `[lo, hi)` plus the bitmap bits will never
    /// arrive. Advances `next_seq` past known-missing and returns any
    /// buffered samples that became deliverable.
    pub fn gap(
        &mut self,
        lo: SequenceNumber,
        hi: SequenceNumber,
        bitmap: &SequenceNumberSet,
    ) -> Vec<(SequenceNumber, SampleData)> {
        for seq in lo.max(self.next_seq)..hi {
            self.pending.entry(seq).or_insert(Slot::Gapped);
        }
        for seq in bitmap.iter() {
            if seq >= self.next_seq {
                self.pending.entry(seq).or_insert(Slot::Gapped);
            }
        }

        let mut batch = Vec::new();
        self.drain_contiguous(&mut batch);
        batch
    }

    fn drain_contiguous(&mut self, batch: &mut Vec<(SequenceNumber, SampleData)>) {
        while let Some(slot) = self.pending.remove(&self.next_seq) {
            match slot {
                Slot::Sample(data) => batch.push((self.next_seq, data)),
                Slot::Gapped => {}
            }
            self.next_seq += 1;
        }
    }

    /// Build the ACKNACK bitmap: base is `next_seq`, bits mark sequences in
    /// `(next_seq, end_seq]` that are neither buffered nor gapped.
    ///
    /// `notail` truncates at the first hole - pressure backoff so a reader
    /// with a full delivery queue does not solicit data it cannot ingest.
    /// Missing sequences beyond `max_bits` are silently deferred; the next
    /// heartbeat re-triggers.
    #[must_use]
    pub fn nack_map(
        &self,
        end_seq: SequenceNumber,
        max_bits: u32,
        notail: bool,
    ) -> SequenceNumberSet {
        let base = self.next_seq;
        let mut set = SequenceNumberSet::new(base);
        let max_bits = max_bits.min(MAX_BITMAP_BITS);

        let mut seq = base;
        while seq <= end_seq && seq - base < i64::from(max_bits) {
            if !self.pending.contains_key(&seq) {
                set.insert(seq);
                if notail {
                    break;
                }
            }
            seq += 1;
        }
        set
    }
}
