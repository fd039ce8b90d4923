// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Per-proxy-writer defragmenter.
//!
//! Collects DATA_FRAG runs into complete serialized payloads. Fragment
//! numbers are 1-based on the wire and 0-based in the bitmap. Memory is
//! capped by the number of in-progress samples; when the cap is hit the
//! least recently touched incomplete sample is dropped.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::core::types::{FragmentNumber, SequenceNumber};
use crate::protocol::{DataFrag, FragmentNumberSet, MAX_BITMAP_BITS};

/// Default cap on concurrently reassembling samples.
pub const DEFAULT_MAX_IN_PROGRESS: usize = 64;

#[derive(Debug)]
struct InProgress {
    frag_size: u16,
    total_frags: u32,
    received: Vec<u64>,
    received_count: u32,
    buf: Vec<u8>,
}

impl InProgress {
    fn new(frag_size: u16, sample_size: u32) -> Self {
        let total_frags = sample_size.div_ceil(u32::from(frag_size.max(1)));
        let words = (total_frags as usize).div_ceil(64);
        Self {
            frag_size,
            total_frags,
            received: vec![0u64; words],
            received_count: 0,
            buf: vec![0u8; sample_size as usize],
        }
    }

    fn mark(&mut self, index: u32) -> bool {
        let word = (index / 64) as usize;
        let bit = index % 64;
        let mask = 1u64 << bit;
        if self.received[word] & mask != 0 {
            return false;
        }
        self.received[word] |= mask;
        self.received_count += 1;
        true
    }

    fn has(&self, index: u32) -> bool {
        let word = (index / 64) as usize;
        let bit = index % 64;
        self.received[word] & (1u64 << bit) != 0
    }

    fn is_complete(&self) -> bool {
        self.received_count == self.total_frags
    }
}

/// Fragment reassembly for one proxy writer.
pub struct Defrag {
    in_progress: LruCache<SequenceNumber, InProgress>,
    dropped_incomplete: u64,
}

impl Defrag {
    #[must_use]
    pub fn new(max_in_progress: usize) -> Self {
        let cap = NonZeroUsize::new(max_in_progress.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            in_progress: LruCache::new(cap),
            dropped_incomplete: 0,
        }
    }

    /// Merge a DATA_FRAG submessage.
    ///
    /// Returns the fully reassembled payload once the last fragment lands;
    /// otherwise `None`. Malformed runs (fragment past the sample end,
    /// fragment-size mismatch) are discarded.
    pub fn insert(&mut self, frag: &DataFrag) -> Option<Vec<u8>> {
        if frag.frag_size == 0 || frag.frag_start == 0 || frag.sample_size == 0 {
            log::debug!("[Defrag::insert] malformed DATA_FRAG for seq {}", frag.seq);
            return None;
        }

        if self.in_progress.peek(&frag.seq).is_none() {
            if self.in_progress.len() == usize::from(self.in_progress.cap()) {
                if let Some((seq, dropped)) = self.in_progress.pop_lru() {
                    self.dropped_incomplete += 1;
                    log::debug!(
                        "[Defrag::insert] cap reached, dropping incomplete seq {} ({}/{} frags)",
                        seq,
                        dropped.received_count,
                        dropped.total_frags
                    );
                }
            }
            self.in_progress
                .put(frag.seq, InProgress::new(frag.frag_size, frag.sample_size));
        }

        let sample = self.in_progress.get_mut(&frag.seq)?;
        if sample.frag_size != frag.frag_size {
            log::debug!(
                "[Defrag::insert] fragment size changed mid-sample for seq {}, discarding run",
                frag.seq
            );
            self.in_progress.pop(&frag.seq);
            return None;
        }

        let frag_size = usize::from(frag.frag_size);
        for i in 0..u32::from(frag.frags_in_submessage) {
            let number = frag.frag_start + i; // 1-based
            let index = number - 1; // 0-based
            if index >= sample.total_frags {
                break;
            }
            let src_off = (i as usize) * frag_size;
            let dst_off = (index as usize) * frag_size;
            let take = frag_size.min(sample.buf.len() - dst_off);
            let Some(src) = frag.payload.get(src_off..src_off + take) else {
                break;
            };
            if sample.mark(index) {
                sample.buf[dst_off..dst_off + take].copy_from_slice(src);
            }
        }

        if sample.is_complete() {
            let done = self.in_progress.pop(&frag.seq)?;
            Some(done.buf)
        } else {
            None
        }
    }

    /// Build the NACK_FRAG bitmap of missing fragments for `seq`.
    ///
    /// External numbering is 1-based. For a sample this defragmenter has
    /// never seen, every fragment up to `max_frag` is missing.
    #[must_use]
    pub fn nack_map(
        &mut self,
        seq: SequenceNumber,
        max_frag: FragmentNumber,
        max_bits: u32,
    ) -> FragmentNumberSet {
        let max_bits = max_bits.min(MAX_BITMAP_BITS);

        match self.in_progress.peek(&seq) {
            None => {
                let mut set = FragmentNumberSet::new(1);
                for number in 1..=max_frag.min(max_bits) {
                    set.insert(number);
                }
                set
            }
            Some(sample) => {
                let limit = max_frag.min(sample.total_frags);
                // Base at the first missing fragment.
                let first_missing = (0..limit)
                    .find(|&i| !sample.has(i))
                    .map(|i| i + 1)
                    .unwrap_or(limit + 1);
                let mut set = FragmentNumberSet::new(first_missing);
                let mut number = first_missing;
                while number <= limit && number - first_missing < max_bits {
                    if !sample.has(number - 1) {
                        set.insert(number);
                    }
                    number += 1;
                }
                set
            }
        }
    }

    /// Discard a partially assembled sample (e.g. after a GAP covers it).
    pub fn drop_sample(&mut self, seq: SequenceNumber) {
        self.in_progress.pop(&seq);
    }

    /// Number of samples currently being reassembled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.in_progress.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.in_progress.is_empty()
    }

    /// Incomplete samples dropped due to the in-progress cap.
    #[must_use]
    pub fn dropped_incomplete(&self) -> u64 {
        self.dropped_incomplete
    }
}

impl Default for Defrag {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_PROGRESS)
    }
}
