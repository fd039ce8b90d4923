// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Writer History Cache (WHC)
//!
//! Ordered writer-side history keyed by sequence number, with a secondary
//! per-key index for KEEP_LAST and transient-local resend-by-key. Entries
//! below the lowest unacknowledged sequence are trimmed when durability and
//! history allow; KEEP_ALL inserts block up to `max_blocking_time` when the
//! unacknowledged backlog hits the resource caps.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::data::SampleData;
use crate::core::types::{duration_to_nanos, mono_now, KeyHash, MonoTime, SequenceNumber};
use crate::dds::{Durability, Error, History, QosProfile, Result};

/// Configuration derived from the writer's QoS.
#[derive(Debug, Clone)]
pub struct WhcConfig {
    pub history: History,
    pub durability: Durability,
    /// Cap on unacknowledged samples (KEEP_ALL blocking bound).
    pub max_samples: usize,
    /// Cap on unacknowledged bytes (KEEP_ALL blocking bound).
    pub max_quota_bytes: usize,
    /// Lifespan after the source timestamp; `None` = infinite.
    pub lifespan: Option<Duration>,
}

impl WhcConfig {
    #[must_use]
    pub fn from_qos(qos: &QosProfile) -> Self {
        Self {
            history: qos.history,
            durability: qos.durability,
            max_samples: qos.resource_limits.max_samples,
            max_quota_bytes: qos.resource_limits.max_quota_bytes,
            lifespan: if qos.lifespan.is_infinite() {
                None
            } else {
                Some(qos.lifespan.duration)
            },
        }
    }
}

impl Default for WhcConfig {
    fn default() -> Self {
        Self::from_qos(&QosProfile::default())
    }
}

#[derive(Debug)]
struct WhcEntry {
    data: SampleData,
    /// Monotonic deadline after which the entry is unreadable.
    expiry: Option<MonoTime>,
    borrowed: u32,
}

/// A history entry lent out for retransmission.
///
/// The payload handle is refcounted, so the bytes stay valid even if the
/// entry is trimmed while borrowed; `return_sample` closes the loan for
/// bookkeeping.
#[derive(Debug)]
pub struct BorrowedSample {
    pub seq: SequenceNumber,
    pub data: SampleData,
}

/// Non-blocking snapshot for heartbeat policy.
///
/// `min_seq`/`max_seq` are 0 when the cache is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhcState {
    pub min_seq: SequenceNumber,
    pub max_seq: SequenceNumber,
    pub unacked_bytes: usize,
    pub next_seq: SequenceNumber,
}

struct WhcInner {
    entries: BTreeMap<SequenceNumber, WhcEntry>,
    by_key: HashMap<KeyHash, VecDeque<SequenceNumber>>,
    next_seq: SequenceNumber,
    /// Lowest sequence still required by some matched reliable reader.
    /// Everything below is acknowledged.
    low_watermark: SequenceNumber,
    unacked_bytes: usize,
    unacked_samples: usize,
}

impl WhcInner {
    fn drop_entry(&mut self, seq: SequenceNumber) -> Option<WhcEntry> {
        let entry = self.entries.remove(&seq)?;
        let key = entry.data.key_hash();
        if let Some(list) = self.by_key.get_mut(&key) {
            list.retain(|&s| s != seq);
            if list.is_empty() {
                self.by_key.remove(&key);
            }
        }
        if seq >= self.low_watermark {
            self.unacked_bytes = self.unacked_bytes.saturating_sub(entry.data.len());
            self.unacked_samples = self.unacked_samples.saturating_sub(1);
        }
        Some(entry)
    }
}

/// Writer History Cache.
pub struct WriterHistoryCache {
    cfg: WhcConfig,
    inner: Mutex<WhcInner>,
    space: Condvar,
}

impl WriterHistoryCache {
    #[must_use]
    pub fn new(cfg: WhcConfig) -> Self {
        Self {
            cfg,
            inner: Mutex::new(WhcInner {
                entries: BTreeMap::new(),
                by_key: HashMap::new(),
                next_seq: 1,
                low_watermark: 1,
                unacked_bytes: 0,
                unacked_samples: 0,
            }),
            space: Condvar::new(),
        }
    }

    /// Sequence number the next insert must carry.
    #[must_use]
    pub fn next_seq(&self) -> SequenceNumber {
        self.inner.lock().next_seq
    }

    /// Append a sample.
    ///
    /// Sequence numbers are strictly increasing: `seq` must equal the
    /// current `next_seq`. Under KEEP_ALL, blocks while the unacknowledged
    /// backlog exceeds the resource caps, up to `max_blocking_time`.
    ///
    /// # Errors
    ///
    /// `Error::Timeout` when the caps still block after the budget;
    /// `Error::BadParameter` on a sequence mismatch. Nothing is dropped
    /// silently.
    pub fn insert(
        &self,
        seq: SequenceNumber,
        data: SampleData,
        max_blocking_time: Duration,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        if seq != inner.next_seq {
            return Err(Error::BadParameter(format!(
                "WHC sequence must be strictly increasing: got {}, expected {}",
                seq, inner.next_seq
            )));
        }

        let len = data.len();
        if matches!(self.cfg.history, History::KeepAll) {
            let deadline = Instant::now() + max_blocking_time;
            while inner.unacked_samples + 1 > self.cfg.max_samples
                || inner.unacked_bytes + len > self.cfg.max_quota_bytes
            {
                let now = Instant::now();
                if now >= deadline {
                    log::debug!(
                        "[WriterHistoryCache::insert] blocked past max_blocking_time \
                         (unacked {} samples / {} bytes)",
                        inner.unacked_samples,
                        inner.unacked_bytes
                    );
                    return Err(Error::Timeout);
                }
                let timed_out = self
                    .space
                    .wait_for(&mut inner, deadline - now)
                    .timed_out();
                if timed_out
                    && (inner.unacked_samples + 1 > self.cfg.max_samples
                        || inner.unacked_bytes + len > self.cfg.max_quota_bytes)
                {
                    return Err(Error::Timeout);
                }
            }
        }

        let key = data.key_hash();
        if let History::KeepLast(depth) = self.cfg.history {
            // KEEP_LAST: at most `depth` entries per key survive, acked or not.
            let excess: Vec<SequenceNumber> = inner
                .by_key
                .get(&key)
                .map(|list| {
                    let keep = (depth as usize).saturating_sub(1);
                    let drop_n = list.len().saturating_sub(keep);
                    list.iter().take(drop_n).copied().collect()
                })
                .unwrap_or_default();
            for old in excess {
                inner.drop_entry(old);
            }
        }

        let expiry = self.cfg.lifespan.map(|l| {
            mono_now().saturating_add(duration_to_nanos(l))
        });
        inner.entries.insert(
            seq,
            WhcEntry {
                data,
                expiry,
                borrowed: 0,
            },
        );
        inner.by_key.entry(key).or_default().push_back(seq);
        inner.next_seq = seq + 1;
        inner.unacked_bytes += len;
        inner.unacked_samples += 1;
        Ok(())
    }

    /// Lend an entry for retransmission.
    ///
    /// Returns `None` for trimmed, never-written or lifespan-expired
    /// sequences; the delivery engine turns that into a GAP.
    #[must_use]
    pub fn borrow_sample(&self, seq: SequenceNumber) -> Option<BorrowedSample> {
        let mut inner = self.inner.lock();
        let now = mono_now();
        let entry = inner.entries.get_mut(&seq)?;
        if entry.expiry.is_some_and(|e| now > e) {
            return None;
        }
        entry.borrowed += 1;
        Some(BorrowedSample {
            seq,
            data: entry.data.clone(),
        })
    }

    /// Lend the most recent entry for a key (transient-local resend path).
    #[must_use]
    pub fn borrow_sample_key(&self, key: &KeyHash) -> Option<BorrowedSample> {
        let seq = {
            let inner = self.inner.lock();
            inner.by_key.get(key)?.back().copied()?
        };
        self.borrow_sample(seq)
    }

    /// Close a loan opened by `borrow_sample`/`borrow_sample_key`.
    pub fn return_sample(&self, borrowed: BorrowedSample) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(&borrowed.seq) {
            entry.borrowed = entry.borrowed.saturating_sub(1);
        }
    }

    /// Trim entries fully acknowledged below `lo`.
    ///
    /// Retention still honors durability + history: a transient-local
    /// writer keeps its per-key history for late joiners. Returns the
    /// earliest lifespan expiry among surviving entries, for scheduling
    /// the next trim.
    pub fn remove_acked_messages(&self, lo: SequenceNumber) -> Option<MonoTime> {
        let mut inner = self.inner.lock();
        if lo > inner.low_watermark {
            // Re-account entries crossing into acked territory.
            let crossing: Vec<(SequenceNumber, usize)> = inner
                .entries
                .range(inner.low_watermark..lo)
                .map(|(s, e)| (*s, e.data.len()))
                .collect();
            for (_, len) in &crossing {
                inner.unacked_bytes = inner.unacked_bytes.saturating_sub(*len);
                inner.unacked_samples = inner.unacked_samples.saturating_sub(1);
            }
            inner.low_watermark = lo;
        }

        let now = mono_now();
        let retain_for_durability = self.cfg.durability >= Durability::TransientLocal;

        let candidates: Vec<SequenceNumber> = inner
            .entries
            .range(..inner.low_watermark)
            .map(|(s, _)| *s)
            .collect();

        for seq in candidates {
            let expired = inner
                .entries
                .get(&seq)
                .and_then(|e| e.expiry)
                .is_some_and(|e| now > e);

            if retain_for_durability && !expired {
                // Late joiners still need it; KEEP_LAST depth was already
                // enforced at insert, KEEP_ALL keeps everything.
                continue;
            }
            inner.drop_entry(seq);
        }

        self.space.notify_all();

        inner
            .entries
            .values()
            .filter_map(|e| e.expiry)
            .filter(|&e| e > now)
            .min()
    }

    /// Snapshot for the heartbeat policy.
    #[must_use]
    pub fn get_state(&self) -> WhcState {
        let inner = self.inner.lock();
        let min_seq = inner.entries.keys().next().copied().unwrap_or(0);
        let max_seq = inner.entries.keys().next_back().copied().unwrap_or(0);
        WhcState {
            min_seq,
            max_seq,
            unacked_bytes: inner.unacked_bytes,
            next_seq: inner.next_seq,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Snapshot retained entries in sequence order (transient-local
    /// late-joiner replay).
    #[must_use]
    pub fn snapshot(&self) -> Vec<(SequenceNumber, SampleData)> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(seq, e)| (*seq, e.data.clone()))
            .collect()
    }

    /// Sequence numbers currently held for a key, oldest first.
    #[must_use]
    pub fn seqs_for_key(&self, key: &KeyHash) -> Vec<SequenceNumber> {
        self.inner
            .lock()
            .by_key
            .get(key)
            .map(|l| l.iter().copied().collect())
            .unwrap_or_default()
    }
}
