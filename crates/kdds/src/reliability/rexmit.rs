// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Retransmit queue: FIFO of pending re-sends with byte and message caps.
//!
//! A queued retransmit targeting the same (writer, seq, frag) as a pending
//! one merges destination sets instead of duplicating the payload. Caps
//! are soft for force-flagged submissions and hard otherwise; hard rejects
//! drop silently and are counted.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::core::data::SampleData;
use crate::core::types::{FragmentNumber, Guid, SequenceNumber};

/// Caps for the retransmit queue.
#[derive(Debug, Clone)]
pub struct RexmitConfig {
    pub max_queued_rexmit_bytes: usize,
    pub max_queued_rexmit_msgs: usize,
}

impl Default for RexmitConfig {
    fn default() -> Self {
        Self {
            max_queued_rexmit_bytes: 512 * 1024,
            max_queued_rexmit_msgs: 200,
        }
    }
}

/// One queued retransmission (whole sample, or one fragment of it).
#[derive(Debug)]
pub struct RexmitSample {
    pub writer: Guid,
    pub seq: SequenceNumber,
    /// `None` retransmits the whole sample.
    pub frag: Option<FragmentNumber>,
    pub data: SampleData,
    /// Readers this retransmit is addressed to.
    pub dests: HashSet<Guid>,
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RexmitPush {
    Queued,
    /// Destination merged into an already-pending entry.
    Merged,
    /// Caps hit on a non-forced submission; dropped and counted.
    Dropped,
}

struct RexmitInner {
    queue: VecDeque<RexmitSample>,
    bytes: usize,
}

/// FIFO retransmit queue with destination merging.
pub struct RetransmitQueue {
    cfg: RexmitConfig,
    inner: Mutex<RexmitInner>,
    dropped: AtomicU64,
}

impl RetransmitQueue {
    #[must_use]
    pub fn new(cfg: RexmitConfig) -> Self {
        Self {
            cfg,
            inner: Mutex::new(RexmitInner {
                queue: VecDeque::new(),
                bytes: 0,
            }),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a retransmit for `dest`.
    ///
    /// Merging happens under the queue lock so the destination-set
    /// invariant (one pending entry per (writer, seq, frag)) holds.
    pub fn push(
        &self,
        writer: Guid,
        seq: SequenceNumber,
        frag: Option<FragmentNumber>,
        data: SampleData,
        dest: Guid,
        force: bool,
    ) -> RexmitPush {
        let mut inner = self.inner.lock();

        if let Some(pending) = inner
            .queue
            .iter_mut()
            .find(|p| p.writer == writer && p.seq == seq && p.frag == frag)
        {
            pending.dests.insert(dest);
            return RexmitPush::Merged;
        }

        let size = data.len();
        let over_caps = inner.bytes + size > self.cfg.max_queued_rexmit_bytes
            || inner.queue.len() >= self.cfg.max_queued_rexmit_msgs;
        if over_caps && !force {
            drop(inner);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "[RetransmitQueue::push] caps hit, dropping rexmit of seq {} (writer {})",
                seq,
                writer
            );
            return RexmitPush::Dropped;
        }

        let mut dests = HashSet::new();
        dests.insert(dest);
        inner.bytes += size;
        inner.queue.push_back(RexmitSample {
            writer,
            seq,
            frag,
            data,
            dests,
        });
        RexmitPush::Queued
    }

    /// Dequeue the oldest pending retransmit.
    #[must_use]
    pub fn pop(&self) -> Option<RexmitSample> {
        let mut inner = self.inner.lock();
        let sample = inner.queue.pop_front()?;
        inner.bytes = inner.bytes.saturating_sub(sample.data.len());
        Some(sample)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().queue.is_empty()
    }

    #[must_use]
    pub fn queued_bytes(&self) -> usize {
        self.inner.lock().bytes
    }

    /// Retransmits silently dropped at the caps.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Remove pending entries no longer addressed to anyone (e.g. after a
    /// reader unmatch).
    pub fn purge_dest(&self, dest: &Guid) {
        let mut inner = self.inner.lock();
        let mut bytes = inner.bytes;
        inner.queue.retain_mut(|p| {
            p.dests.remove(dest);
            if p.dests.is_empty() {
                bytes = bytes.saturating_sub(p.data.len());
                false
            } else {
                true
            }
        });
        inner.bytes = bytes;
    }
}

impl Default for RetransmitQueue {
    fn default() -> Self {
        Self::new(RexmitConfig::default())
    }
}
