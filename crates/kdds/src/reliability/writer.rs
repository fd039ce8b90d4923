// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Writer-side reliable-delivery state machine.
//!
//! Tracks per-matched-reader acknowledgment state, schedules heartbeats
//! (standalone and piggybacked), and reacts to ACKNACK / NACK_FRAG by
//! feeding the retransmit queue and emitting GAPs for trimmed history.

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::rexmit::RetransmitQueue;
use super::ReliabilityConfig;
use crate::core::types::{duration_to_nanos, Guid, MonoTime, SequenceNumber};
use crate::protocol::{AckNack, NackFrag};
use crate::whc::{WhcState, WriterHistoryCache};

/// Per-matched-reader bookkeeping.
#[derive(Debug, Clone)]
pub struct MatchedReaderState {
    /// Everything below this sequence is acknowledged.
    pub acked_below: SequenceNumber,
    /// Whether the reader replied to the most recent soliciting heartbeat.
    pub replied_to_hb: bool,
    /// Anti-replay: highest ACKNACK count processed.
    pub last_acknack_count: u32,
    /// NACK_FRAGs processed for this reader.
    pub nackfrag_count: u32,
    /// Retransmit caps pushed back on this reader's last repair request.
    pub congested: bool,
    /// When the reader last nacked, and the highest sequence it asked for.
    pub t_last_nack: MonoTime,
    pub seq_last_nack: SequenceNumber,
}

impl MatchedReaderState {
    fn new() -> Self {
        Self {
            acked_below: 1,
            replied_to_hb: false,
            last_acknack_count: 0,
            nackfrag_count: 0,
            congested: false,
            t_last_nack: 0,
            seq_last_nack: 0,
        }
    }
}

/// Heartbeat the delivery engine should put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPlan {
    pub first_seq: SequenceNumber,
    pub last_seq: SequenceNumber,
    pub count: u32,
    /// FINAL set when no response is solicited.
    pub final_flag: bool,
}

/// Reaction to one ACKNACK.
#[derive(Debug, Default)]
pub struct AcknackReaction {
    /// Sequences queued for retransmission.
    pub retransmits: Vec<SequenceNumber>,
    /// Requested sequences the history no longer holds; emit a GAP.
    pub gaps: Vec<SequenceNumber>,
    /// The global ack watermark moved; the WHC may trim.
    pub watermark_advanced: bool,
}

/// Writer-side reliability state over all matched readers.
pub struct ReliableWriter {
    guid: Guid,
    cfg: ReliabilityConfig,
    readers: DashMap<Guid, MatchedReaderState>,
    hb_count: AtomicU32,
    next_hb_deadline: Mutex<MonoTime>,
}

impl ReliableWriter {
    #[must_use]
    pub fn new(guid: Guid, cfg: ReliabilityConfig) -> Self {
        Self {
            guid,
            cfg,
            readers: DashMap::new(),
            hb_count: AtomicU32::new(0),
            next_hb_deadline: Mutex::new(0),
        }
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn add_reader(&self, reader: Guid) {
        self.readers.entry(reader).or_insert_with(MatchedReaderState::new);
    }

    pub fn remove_reader(&self, reader: &Guid) -> bool {
        self.readers.remove(reader).is_some()
    }

    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    /// Lowest sequence still required by some matched reader.
    ///
    /// `None` with no matched readers (everything is trimmable then).
    #[must_use]
    pub fn acked_watermark(&self) -> Option<SequenceNumber> {
        self.readers.iter().map(|r| r.acked_below).min()
    }

    /// Whether every matched reader acknowledged the full history.
    #[must_use]
    pub fn all_acked(&self, whc: &WhcState) -> bool {
        self.readers.iter().all(|r| r.acked_below > whc.max_seq)
    }

    /// Snapshot of one reader's state (diagnostics and tests).
    #[must_use]
    pub fn reader_state(&self, reader: &Guid) -> Option<MatchedReaderState> {
        self.readers.get(reader).map(|r| r.clone())
    }

    // ========================================================================
    // Heartbeat scheduling
    // ========================================================================

    /// Evaluate the heartbeat timer.
    ///
    /// Suppresses entirely when there is nothing to advertise and nothing
    /// unacknowledged; otherwise emits when the deadline passed, scaling
    /// the next interval by data volume, reader fan-out and whether all
    /// readers replied to the previous solicitation.
    pub fn on_heartbeat_tick(&self, now: MonoTime, whc: &WhcState) -> Option<HeartbeatPlan> {
        if self.readers.is_empty() {
            return None;
        }
        let all_acked = self.all_acked(whc);
        if whc.max_seq == 0 && all_acked {
            return None;
        }
        if all_acked && whc.unacked_bytes == 0 {
            // Nothing outstanding: let the timer idle.
            return None;
        }

        let mut deadline = self.next_hb_deadline.lock();
        if now < *deadline {
            return None;
        }

        let interval = self.next_interval(whc, all_acked);
        *deadline = now.saturating_add(interval);
        drop(deadline);

        Some(self.build_heartbeat(whc, all_acked))
    }

    /// Heartbeat piggybacked on an outgoing DATA submessage.
    ///
    /// Chosen when the fan-out warrants solicitation: several readers, or
    /// some reader lagging behind the history.
    pub fn piggyback_heartbeat(&self, whc: &WhcState) -> Option<HeartbeatPlan> {
        if self.readers.is_empty() {
            return None;
        }
        let all_acked = self.all_acked(whc);
        let lagging = !all_acked;
        if self.readers.len() > 1 || lagging {
            Some(self.build_heartbeat(whc, false))
        } else {
            None
        }
    }

    fn build_heartbeat(&self, whc: &WhcState, final_flag: bool) -> HeartbeatPlan {
        let count = self.hb_count.fetch_add(1, Ordering::Relaxed) + 1;
        // An empty history advertises [next, next-1]: nothing available.
        let (first, last) = if whc.max_seq == 0 {
            (whc.next_seq, whc.next_seq - 1)
        } else {
            (whc.min_seq, whc.max_seq)
        };
        for mut reader in self.readers.iter_mut() {
            if !final_flag {
                reader.replied_to_hb = false;
            }
        }
        HeartbeatPlan {
            first_seq: first,
            last_seq: last,
            count,
            final_flag,
        }
    }

    fn next_interval(&self, whc: &WhcState, all_acked: bool) -> i64 {
        let min = duration_to_nanos(self.cfg.hb_interval_min);
        let max = duration_to_nanos(self.cfg.hb_interval_max);

        // Heavy backlog or wide fan-out: solicit at the lower bound.
        if whc.unacked_bytes >= self.cfg.hb_high_watermark_bytes || self.readers.len() >= 8 {
            return min;
        }

        let all_replied = self.readers.iter().all(|r| r.replied_to_hb);
        if all_acked && all_replied {
            // Idle: back off hard.
            return (min.saturating_mul(8)).min(max);
        }
        if all_replied {
            return (min.saturating_mul(2)).min(max);
        }
        min
    }

    // ========================================================================
    // ACKNACK / NACK_FRAG reaction
    // ========================================================================

    /// Process one ACKNACK from `reader`.
    ///
    /// Updates the ack watermark, queues retransmits for requested
    /// sequences still in history, and reports trimmed ones for GAPs.
    pub fn on_acknack(
        &self,
        reader: Guid,
        an: &AckNack,
        now: MonoTime,
        whc: &WriterHistoryCache,
        rexmit: &RetransmitQueue,
    ) -> AcknackReaction {
        let mut reaction = AcknackReaction::default();
        let Some(mut state) = self.readers.get_mut(&reader) else {
            log::debug!(
                "[ReliableWriter::on_acknack] ACKNACK from unmatched reader {}, discarding",
                reader
            );
            return reaction;
        };

        if an.count <= state.last_acknack_count && state.last_acknack_count > 0 {
            return reaction;
        }
        state.last_acknack_count = an.count;
        state.replied_to_hb = true;

        let base = an.reader_sn_state.base();
        if base > state.acked_below {
            state.acked_below = base;
            reaction.watermark_advanced = true;
        }

        let mut highest_nacked = 0;
        let mut congested = false;
        for seq in an.reader_sn_state.iter() {
            highest_nacked = highest_nacked.max(seq);
            match whc.borrow_sample(seq) {
                Some(loan) => {
                    let pushed =
                        rexmit.push(self.guid, seq, None, loan.data.clone(), reader, false);
                    whc.return_sample(loan);
                    if matches!(pushed, super::RexmitPush::Dropped) {
                        congested = true;
                    } else {
                        reaction.retransmits.push(seq);
                    }
                }
                None => reaction.gaps.push(seq),
            }
        }
        state.congested = congested;

        if highest_nacked > 0 {
            state.t_last_nack = now;
            state.seq_last_nack = highest_nacked;
        }

        reaction
    }

    /// Process one NACK_FRAG: retransmit the referenced fragments of one
    /// sample. Returns `false` when the sample is gone (the caller emits a
    /// GAP for the whole sequence).
    pub fn on_nackfrag(
        &self,
        reader: Guid,
        nf: &NackFrag,
        whc: &WriterHistoryCache,
        rexmit: &RetransmitQueue,
    ) -> bool {
        let Some(mut state) = self.readers.get_mut(&reader) else {
            return false;
        };
        state.nackfrag_count += 1;
        drop(state);

        let Some(loan) = whc.borrow_sample(nf.seq) else {
            return false;
        };
        for frag in nf.frag_state.iter() {
            rexmit.push(self.guid, nf.seq, Some(frag), loan.data.clone(), reader, false);
        }
        whc.return_sample(loan);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::{SampleData, SampleDataKind};
    use crate::core::types::{KeyHash, Timestamp};
    use crate::protocol::{FragmentNumberSet, SequenceNumberSet};
    use crate::whc::WhcConfig;
    use std::time::Duration;

    fn guid(tag: u8) -> Guid {
        Guid::from_bytes([tag; 16])
    }

    fn payload() -> SampleData {
        SampleData::from_wire(
            SampleDataKind::Data,
            vec![1, 2, 3, 4],
            Vec::new(),
            KeyHash::NONE,
            Timestamp::now(),
            0,
        )
    }

    fn whc_with(seqs: SequenceNumber) -> WriterHistoryCache {
        let whc = WriterHistoryCache::new(WhcConfig::default());
        for seq in 1..=seqs {
            whc.insert(seq, payload(), Duration::ZERO).expect("insert");
        }
        whc
    }

    fn acknack(base: SequenceNumber, missing: &[SequenceNumber], count: u32) -> AckNack {
        AckNack {
            reader_id: [0, 0, 1, 0x07],
            writer_id: [0, 0, 1, 0x02],
            reader_sn_state: SequenceNumberSet::from_sequences(base, missing).expect("fits"),
            count,
            final_flag: false,
        }
    }

    fn writer() -> ReliableWriter {
        ReliableWriter::new(guid(0xA0), ReliabilityConfig::default())
    }

    #[test]
    fn test_acknack_advances_watermark() {
        let w = writer();
        w.add_reader(guid(1));
        w.add_reader(guid(2));
        let whc = whc_with(5);
        let rexmit = RetransmitQueue::default();

        let r = w.on_acknack(guid(1), &acknack(4, &[], 1), 0, &whc, &rexmit);
        assert!(r.watermark_advanced);
        assert_eq!(w.acked_watermark(), Some(1)); // reader 2 still at 1

        let r = w.on_acknack(guid(2), &acknack(6, &[], 1), 0, &whc, &rexmit);
        assert!(r.watermark_advanced);
        assert_eq!(w.acked_watermark(), Some(4));
    }

    #[test]
    fn test_acknack_requests_retransmits() {
        let w = writer();
        w.add_reader(guid(1));
        let whc = whc_with(5);
        let rexmit = RetransmitQueue::default();

        let r = w.on_acknack(guid(1), &acknack(2, &[2, 4], 1), 0, &whc, &rexmit);
        assert_eq!(r.retransmits, vec![2, 4]);
        assert!(r.gaps.is_empty());
        assert_eq!(rexmit.len(), 2);

        let state = w.reader_state(&guid(1)).expect("state");
        assert_eq!(state.seq_last_nack, 4);
    }

    #[test]
    fn test_acknack_gap_for_trimmed_history() {
        let w = writer();
        w.add_reader(guid(1));
        let whc = whc_with(5);
        whc.remove_acked_messages(4); // 1..3 trimmed
        let rexmit = RetransmitQueue::default();

        let r = w.on_acknack(guid(1), &acknack(2, &[2, 4], 1), 0, &whc, &rexmit);
        assert_eq!(r.retransmits, vec![4]);
        assert_eq!(r.gaps, vec![2]);
    }

    #[test]
    fn test_congested_flag_on_rexmit_drop() {
        use super::super::RexmitConfig;

        let w = writer();
        w.add_reader(guid(1));
        let whc = whc_with(3);
        let rexmit = RetransmitQueue::new(RexmitConfig {
            max_queued_rexmit_bytes: usize::MAX,
            max_queued_rexmit_msgs: 1,
        });

        let r = w.on_acknack(guid(1), &acknack(1, &[1, 2], 1), 0, &whc, &rexmit);
        // The second retransmit hit the cap and was dropped (counted).
        assert_eq!(r.retransmits, vec![1]);
        assert_eq!(rexmit.dropped(), 1);
        assert!(w.reader_state(&guid(1)).expect("state").congested);

        // A repair round that fits clears the flag.
        let r = w.on_acknack(guid(1), &acknack(1, &[], 2), 0, &whc, &rexmit);
        assert!(r.retransmits.is_empty());
        assert!(!w.reader_state(&guid(1)).expect("state").congested);
    }

    #[test]
    fn test_acknack_replay_ignored() {
        let w = writer();
        w.add_reader(guid(1));
        let whc = whc_with(3);
        let rexmit = RetransmitQueue::default();

        let _ = w.on_acknack(guid(1), &acknack(2, &[2], 5), 0, &whc, &rexmit);
        let r = w.on_acknack(guid(1), &acknack(3, &[3], 5), 0, &whc, &rexmit);
        assert!(r.retransmits.is_empty());
        assert!(!r.watermark_advanced);
    }

    #[test]
    fn test_acknack_from_unknown_reader_discarded() {
        let w = writer();
        let whc = whc_with(3);
        let rexmit = RetransmitQueue::default();
        let r = w.on_acknack(guid(9), &acknack(2, &[2], 1), 0, &whc, &rexmit);
        assert!(r.retransmits.is_empty());
        assert_eq!(rexmit.len(), 0);
    }

    #[test]
    fn test_heartbeat_suppressed_when_idle() {
        let w = writer();
        w.add_reader(guid(1));
        let whc = WriterHistoryCache::new(WhcConfig::default());
        assert!(w.on_heartbeat_tick(0, &whc.get_state()).is_none());
    }

    #[test]
    fn test_heartbeat_advertises_range_and_respects_deadline() {
        let w = writer();
        w.add_reader(guid(1));
        let whc = whc_with(3);
        let state = whc.get_state();

        let hb = w.on_heartbeat_tick(0, &state).expect("due immediately");
        assert_eq!(hb.first_seq, 1);
        assert_eq!(hb.last_seq, 3);
        assert!(!hb.final_flag);
        assert_eq!(hb.count, 1);

        // Deadline set: an immediate second tick is suppressed.
        assert!(w.on_heartbeat_tick(1, &state).is_none());

        // Past the deadline it fires again with a bumped count.
        let later = duration_to_nanos(Duration::from_secs(60));
        let hb2 = w.on_heartbeat_tick(later, &state).expect("due again");
        assert_eq!(hb2.count, 2);
    }

    #[test]
    fn test_piggyback_for_fanout_or_lag() {
        let w = writer();
        w.add_reader(guid(1));
        let whc = whc_with(2);
        let state = whc.get_state();

        // One lagging reader: piggyback chosen.
        assert!(w.piggyback_heartbeat(&state).is_some());

        // Reader fully acked, single reader: no piggyback.
        let rexmit = RetransmitQueue::default();
        let _ = w.on_acknack(guid(1), &acknack(3, &[], 1), 0, &whc, &rexmit);
        assert!(w.piggyback_heartbeat(&state).is_none());

        // Second reader restores the fan-out criterion.
        w.add_reader(guid(2));
        assert!(w.piggyback_heartbeat(&state).is_some());
    }

    #[test]
    fn test_nackfrag_queues_fragments() {
        let w = writer();
        w.add_reader(guid(1));
        let whc = whc_with(2);
        let rexmit = RetransmitQueue::default();

        let mut frags = FragmentNumberSet::new(1);
        frags.insert(1);
        frags.insert(3);
        let nf = NackFrag {
            reader_id: [0, 0, 1, 0x07],
            writer_id: [0, 0, 1, 0x02],
            seq: 2,
            frag_state: frags,
            count: 1,
        };

        assert!(w.on_nackfrag(guid(1), &nf, &whc, &rexmit));
        assert_eq!(rexmit.len(), 2);
        let first = rexmit.pop().expect("entry");
        assert_eq!(first.frag, Some(1));
        assert_eq!(
            w.reader_state(&guid(1)).expect("state").nackfrag_count,
            1
        );
    }

    #[test]
    fn test_nackfrag_for_trimmed_sample() {
        let w = writer();
        w.add_reader(guid(1));
        let whc = whc_with(2);
        whc.remove_acked_messages(3);
        let rexmit = RetransmitQueue::default();

        let nf = NackFrag {
            reader_id: [0, 0, 1, 0x07],
            writer_id: [0, 0, 1, 0x02],
            seq: 1,
            frag_state: FragmentNumberSet::new(1),
            count: 1,
        };
        assert!(!w.on_nackfrag(guid(1), &nf, &whc, &rexmit));
    }
}
