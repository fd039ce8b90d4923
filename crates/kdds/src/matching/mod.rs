// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Matching engine: QoS compatibility between writers and readers, the
//! in-process match registry that produces match events, and liveliness
//! lease tracking.
//!
//! The registry doubles as the entity index of the domain: endpoints are
//! registered by GUID, and every cross-entity reference goes through a
//! GUID lookup that may fail (no back-pointers, no cycles). A
//! (writer, reader) pair is in exactly one of three states: unmatched,
//! matched, or incompatible.

mod liveliness;

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::core::data::SampleData;
use crate::core::types::{duration_to_nanos, mono_now, Guid, InstanceHandle, MonoTime, SequenceNumber};
use crate::dds::{Deadline, Durability, PolicyId, QosProfile, Reliability, StatusRegistry};
use crate::reliability::{ReliableWriter, RetransmitQueue};
use crate::rhc::ReaderHistoryCache;
use crate::whc::WriterHistoryCache;

pub use liveliness::{LeaseRegistry, ParticipantLiveliness};

// ============================================================================
// QoS compatibility
// ============================================================================

/// Check request/offer compatibility.
///
/// # Errors
///
/// The first offending policy in evaluation order (reliability,
/// durability, deadline, liveliness, ownership, destination order) - the
/// first encountered wins the status's `last_policy_id`.
pub fn check_compatibility(offered: &QosProfile, requested: &QosProfile) -> Result<(), PolicyId> {
    if !offered.reliability.is_compatible_with(&requested.reliability) {
        return Err(PolicyId::Reliability);
    }
    if !offered.durability.is_compatible_with(&requested.durability) {
        return Err(PolicyId::Durability);
    }
    if !offered.deadline.is_compatible_with(&requested.deadline) {
        return Err(PolicyId::Deadline);
    }
    if !offered.liveliness.is_compatible_with(&requested.liveliness) {
        return Err(PolicyId::Liveliness);
    }
    if !offered.ownership.is_compatible_with(&requested.ownership) {
        return Err(PolicyId::Ownership);
    }
    if !offered
        .destination_order
        .is_compatible_with(&requested.destination_order)
    {
        return Err(PolicyId::DestinationOrder);
    }
    Ok(())
}

/// State of one (writer, reader) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Unmatched,
    Matched,
    Incompatible(PolicyId),
}

/// The small QoS subset that stays mutable after entity creation.
///
/// Endpoints publish it through an `ArcSwap` so the hot paths (deadline
/// sweeps, ownership arbitration) read a consistent snapshot without a
/// lock.
#[derive(Debug, Clone)]
pub struct MutableQos {
    pub ownership_strength: i32,
    pub deadline: Deadline,
    /// `None` = absent, `Some(vec![])` = present and empty.
    pub user_data: Option<Vec<u8>>,
}

impl MutableQos {
    #[must_use]
    pub fn from_qos(qos: &QosProfile) -> Self {
        Self {
            ownership_strength: qos.ownership.strength,
            deadline: qos.deadline,
            user_data: qos.user_data.clone(),
        }
    }
}

// ============================================================================
// Endpoint records
// ============================================================================

/// Writer-side endpoint record held by the registry.
pub struct WriterEndpoint {
    pub guid: Guid,
    pub topic: String,
    pub type_name: String,
    pub qos: QosProfile,
    pub status: Arc<StatusRegistry>,
    pub whc: Arc<WriterHistoryCache>,
    pub reliable: Arc<ReliableWriter>,
    pub rexmit: Arc<RetransmitQueue>,
    /// Matched readers, for data fan-out.
    pub matched: DashMap<Guid, Arc<ReaderEndpoint>>,
    /// The mutable QoS subset (ownership strength, deadline, user data).
    mutable: ArcSwap<MutableQos>,
    /// Last write per instance, for offered-deadline tracking.
    deadlines: Mutex<HashMap<InstanceHandle, MonoTime>>,
}

impl WriterEndpoint {
    #[must_use]
    pub fn new(
        guid: Guid,
        topic: String,
        type_name: String,
        qos: QosProfile,
        status: Arc<StatusRegistry>,
        whc: Arc<WriterHistoryCache>,
        reliable: Arc<ReliableWriter>,
        rexmit: Arc<RetransmitQueue>,
    ) -> Self {
        let mutable = ArcSwap::from_pointee(MutableQos::from_qos(&qos));
        Self {
            guid,
            topic,
            type_name,
            qos,
            status,
            whc,
            reliable,
            rexmit,
            matched: DashMap::new(),
            mutable,
            deadlines: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of the mutable QoS subset.
    #[must_use]
    pub fn mutable_qos(&self) -> Arc<MutableQos> {
        self.mutable.load_full()
    }

    /// Replace the mutable QoS subset.
    pub fn set_mutable_qos(&self, mutable: MutableQos) {
        self.mutable.store(Arc::new(mutable));
    }

    /// Refresh offered-deadline tracking for an instance.
    pub fn record_write(&self, handle: InstanceHandle, now: MonoTime) {
        if !self.mutable.load().deadline.is_infinite() {
            self.deadlines.lock().insert(handle, now);
        }
    }

    /// Offered-deadline sweep: one `offered_deadline_missed` per elapsed
    /// period per overdue instance.
    pub fn check_deadlines(&self, now: MonoTime) {
        let deadline = self.mutable.load().deadline;
        if deadline.is_infinite() {
            return;
        }
        let period = duration_to_nanos(deadline.period);
        let overdue: Vec<InstanceHandle> = {
            let mut deadlines = self.deadlines.lock();
            deadlines
                .iter_mut()
                .filter(|(_, last)| now.saturating_sub(**last) >= period)
                .map(|(handle, last)| {
                    *last = now;
                    *handle
                })
                .collect()
        };
        for handle in overdue {
            self.status.push_offered_deadline_missed(handle);
        }
    }
}

/// Reader-side endpoint record held by the registry.
pub struct ReaderEndpoint {
    pub guid: Guid,
    pub topic: String,
    pub type_name: String,
    pub qos: QosProfile,
    pub status: Arc<StatusRegistry>,
    pub rhc: Arc<ReaderHistoryCache>,
    pub leases: Arc<LeaseRegistry>,
    pub matched_writers: DashMap<Guid, ()>,
    /// The mutable QoS subset (deadline, user data).
    mutable: ArcSwap<MutableQos>,
    /// Last reception per instance, for requested-deadline tracking.
    deadlines: Mutex<HashMap<InstanceHandle, MonoTime>>,
}

impl ReaderEndpoint {
    #[must_use]
    pub fn new(
        guid: Guid,
        topic: String,
        type_name: String,
        qos: QosProfile,
        status: Arc<StatusRegistry>,
        rhc: Arc<ReaderHistoryCache>,
    ) -> Self {
        let leases = Arc::new(LeaseRegistry::new(Arc::clone(&status)));
        let mutable = ArcSwap::from_pointee(MutableQos::from_qos(&qos));
        Self {
            guid,
            topic,
            type_name,
            qos,
            status,
            rhc,
            leases,
            matched_writers: DashMap::new(),
            mutable,
            deadlines: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of the mutable QoS subset.
    #[must_use]
    pub fn mutable_qos(&self) -> Arc<MutableQos> {
        self.mutable.load_full()
    }

    /// Replace the mutable QoS subset.
    pub fn set_mutable_qos(&self, mutable: MutableQos) {
        self.mutable.store(Arc::new(mutable));
    }

    /// Deliver one sample from a matched writer: store, renew the writer's
    /// lease, refresh deadline tracking.
    pub fn store_sample(&self, writer: Guid, seq: SequenceNumber, data: SampleData) -> bool {
        let key = data.key_hash();
        let accepted = self.rhc.store(writer, seq, data);
        let now = mono_now();
        self.leases.renew(&writer, now);
        if accepted && !self.mutable.load().deadline.is_infinite() {
            if let Some(handle) = self.rhc.lookup_instance(&key) {
                self.deadlines.lock().insert(handle, now);
            }
        }
        accepted
    }

    /// Requested-deadline sweep: every instance overdue for an update gets
    /// one `requested_deadline_missed` per elapsed period.
    pub fn check_deadlines(&self, now: MonoTime) {
        let deadline = self.mutable.load().deadline;
        if deadline.is_infinite() {
            return;
        }
        let period = duration_to_nanos(deadline.period);
        let overdue: Vec<InstanceHandle> = {
            let mut deadlines = self.deadlines.lock();
            deadlines
                .iter_mut()
                .filter(|(_, last)| now.saturating_sub(**last) >= period)
                .map(|(handle, last)| {
                    *last = now;
                    *handle
                })
                .collect()
        };
        for handle in overdue {
            self.status.push_requested_deadline_missed(handle);
        }
    }

    /// Expire liveliness leases and propagate the instance-state fallout.
    pub fn check_liveliness(&self, now: MonoTime) {
        for writer in self.leases.check_expired(now) {
            self.rhc.writer_lost(writer);
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// In-process match registry: the "external source" of match events.
pub struct MatchRegistry {
    writers: DashMap<Guid, Arc<WriterEndpoint>>,
    readers: DashMap<Guid, Arc<ReaderEndpoint>>,
    matches: DashMap<(Guid, Guid), MatchState>,
}

impl MatchRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            writers: DashMap::new(),
            readers: DashMap::new(),
            matches: DashMap::new(),
        }
    }

    #[must_use]
    pub fn writer(&self, guid: &Guid) -> Option<Arc<WriterEndpoint>> {
        self.writers.get(guid).map(|w| Arc::clone(&w))
    }

    #[must_use]
    pub fn reader(&self, guid: &Guid) -> Option<Arc<ReaderEndpoint>> {
        self.readers.get(guid).map(|r| Arc::clone(&r))
    }

    /// Current state of a (writer, reader) pair.
    #[must_use]
    pub fn match_state(&self, writer: &Guid, reader: &Guid) -> MatchState {
        self.matches
            .get(&(*writer, *reader))
            .map_or(MatchState::Unmatched, |s| *s)
    }

    pub fn register_writer(&self, writer: Arc<WriterEndpoint>) {
        self.writers.insert(writer.guid, Arc::clone(&writer));
        let readers: Vec<Arc<ReaderEndpoint>> = self
            .readers
            .iter()
            .map(|r| Arc::clone(&r))
            .collect();
        for reader in readers {
            self.evaluate_pair(&writer, &reader);
        }
    }

    pub fn register_reader(&self, reader: Arc<ReaderEndpoint>) {
        self.readers.insert(reader.guid, Arc::clone(&reader));
        let writers: Vec<Arc<WriterEndpoint>> = self
            .writers
            .iter()
            .map(|w| Arc::clone(&w))
            .collect();
        for writer in writers {
            self.evaluate_pair(&writer, &reader);
        }
    }

    /// Delete a writer: matched readers observe the unmatch, lose the
    /// writer's registrations, and drop its lease.
    pub fn unregister_writer(&self, guid: &Guid) {
        let Some((_, writer)) = self.writers.remove(guid) else {
            return;
        };
        for entry in writer.matched.iter() {
            let reader = entry.value();
            reader.status.push_subscription_unmatch(*guid);
            reader.leases.remove_writer(guid);
            reader.rhc.writer_lost(*guid);
            reader.matched_writers.remove(guid);
            writer.status.push_publication_unmatch(reader.guid);
        }
        writer.matched.clear();
        self.matches.retain(|(w, _), _| w != guid);
    }

    /// Delete a reader.
    pub fn unregister_reader(&self, guid: &Guid) {
        let Some((_, reader)) = self.readers.remove(guid) else {
            return;
        };
        for writer_guid in reader.matched_writers.iter().map(|e| *e.key()) {
            if let Some(writer) = self.writer(&writer_guid) {
                writer.status.push_publication_unmatch(*guid);
                writer.reliable.remove_reader(guid);
                writer.rexmit.purge_dest(guid);
                writer.matched.remove(guid);
            }
            reader.status.push_subscription_unmatch(writer_guid);
        }
        self.matches.retain(|(_, r), _| r != guid);
    }

    fn evaluate_pair(&self, writer: &Arc<WriterEndpoint>, reader: &Arc<ReaderEndpoint>) {
        if writer.topic != reader.topic {
            return;
        }
        if writer.type_name != reader.type_name {
            log::debug!(
                "[MatchRegistry] inconsistent topic {}: writer type {} vs reader type {}",
                writer.topic,
                writer.type_name,
                reader.type_name
            );
            writer.status.push_inconsistent_topic();
            reader.status.push_inconsistent_topic();
            return;
        }
        if !writer.qos.partition.overlaps(&reader.qos.partition) {
            return;
        }

        let pair = (writer.guid, reader.guid);
        match check_compatibility(&writer.qos, &reader.qos) {
            Err(policy) => {
                writer.status.push_offered_incompatible_qos(policy);
                reader.status.push_requested_incompatible_qos(policy);
                self.matches.insert(pair, MatchState::Incompatible(policy));
            }
            Ok(()) => {
                self.matches.insert(pair, MatchState::Matched);
                writer.matched.insert(reader.guid, Arc::clone(reader));
                reader.matched_writers.insert(writer.guid, ());
                if matches!(reader.qos.reliability, Reliability::Reliable) {
                    writer.reliable.add_reader(reader.guid);
                }

                writer.status.push_publication_match(reader.guid);
                reader.status.push_subscription_match(writer.guid);
                reader
                    .leases
                    .add_writer(writer.guid, &writer.qos.liveliness, mono_now());

                // Transient-local late joiner: replay retained history.
                if writer.qos.durability >= Durability::TransientLocal
                    && reader.qos.durability >= Durability::TransientLocal
                {
                    for (seq, data) in writer.whc.snapshot() {
                        reader.store_sample(writer.guid, seq, data);
                    }
                }
            }
        }
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dds::{Liveliness, QosProfile};
    use crate::reliability::ReliabilityConfig;
    use crate::rhc::RhcConfig;
    use crate::whc::WhcConfig;
    use std::time::Duration;

    fn guid(tag: u8) -> Guid {
        Guid::from_bytes([tag; 16])
    }

    fn writer_ep(tag: u8, topic: &str, qos: QosProfile) -> Arc<WriterEndpoint> {
        let g = guid(tag);
        Arc::new(WriterEndpoint::new(
            g,
            topic.to_string(),
            "TestType".to_string(),
            qos.clone(),
            Arc::new(StatusRegistry::new()),
            Arc::new(WriterHistoryCache::new(WhcConfig::from_qos(&qos))),
            Arc::new(ReliableWriter::new(g, ReliabilityConfig::default())),
            Arc::new(RetransmitQueue::default()),
        ))
    }

    fn reader_ep(tag: u8, topic: &str, qos: QosProfile) -> Arc<ReaderEndpoint> {
        let status = Arc::new(StatusRegistry::new());
        let rhc = Arc::new(ReaderHistoryCache::new(
            RhcConfig::from_qos(&qos),
            Arc::clone(&status),
        ));
        Arc::new(ReaderEndpoint::new(
            guid(tag),
            topic.to_string(),
            "TestType".to_string(),
            qos,
            status,
            rhc,
        ))
    }

    #[test]
    fn test_match_on_same_topic() {
        let reg = MatchRegistry::new();
        let w = writer_ep(1, "sensors", QosProfile::reliable());
        let r = reader_ep(2, "sensors", QosProfile::reliable());

        reg.register_writer(Arc::clone(&w));
        reg.register_reader(Arc::clone(&r));

        assert_eq!(reg.match_state(&w.guid, &r.guid), MatchState::Matched);
        let pm = w.status.get_publication_matched();
        assert_eq!(pm.current_count, 1);
        assert_eq!(pm.last_subscription_handle, Some(r.guid));
        let sm = r.status.get_subscription_matched();
        assert_eq!(sm.current_count, 1);
        assert_eq!(sm.last_publication_handle, Some(w.guid));
        assert_eq!(w.reliable.reader_count(), 1);
    }

    #[test]
    fn test_no_match_across_topics() {
        let reg = MatchRegistry::new();
        let w = writer_ep(1, "a", QosProfile::default());
        let r = reader_ep(2, "b", QosProfile::default());
        reg.register_writer(Arc::clone(&w));
        reg.register_reader(Arc::clone(&r));
        assert_eq!(reg.match_state(&w.guid, &r.guid), MatchState::Unmatched);
        assert_eq!(w.status.get_publication_matched().total_count, 0);
    }

    #[test]
    fn test_incompatible_reliability_reports_policy() {
        let reg = MatchRegistry::new();
        let w = writer_ep(1, "t", QosProfile::best_effort());
        let r = reader_ep(2, "t", QosProfile::reliable());
        reg.register_writer(Arc::clone(&w));
        reg.register_reader(Arc::clone(&r));

        assert_eq!(
            reg.match_state(&w.guid, &r.guid),
            MatchState::Incompatible(PolicyId::Reliability)
        );
        let offered = w.status.get_offered_incompatible_qos();
        assert_eq!(offered.total_count, 1);
        assert_eq!(offered.last_policy_id, PolicyId::Reliability);
        let requested = r.status.get_requested_incompatible_qos();
        assert_eq!(requested.last_policy_id, PolicyId::Reliability);
    }

    #[test]
    fn test_first_offending_policy_wins() {
        // Both reliability and durability are incompatible; reliability is
        // checked first and wins `last_policy_id`.
        let w_qos = QosProfile::best_effort();
        let r_qos = QosProfile::reliable().durability(Durability::TransientLocal);
        assert_eq!(
            check_compatibility(&w_qos, &r_qos),
            Err(PolicyId::Reliability)
        );
    }

    #[test]
    fn test_partition_mismatch_is_silent() {
        let reg = MatchRegistry::new();
        let w = writer_ep(1, "t", QosProfile::default().partitions(&["left"]));
        let r = reader_ep(2, "t", QosProfile::default().partitions(&["right"]));
        reg.register_writer(Arc::clone(&w));
        reg.register_reader(Arc::clone(&r));

        assert_eq!(reg.match_state(&w.guid, &r.guid), MatchState::Unmatched);
        assert_eq!(w.status.get_offered_incompatible_qos().total_count, 0);
    }

    #[test]
    fn test_inconsistent_topic() {
        let reg = MatchRegistry::new();
        let w = writer_ep(1, "t", QosProfile::default());
        let mut r = reader_ep(2, "t", QosProfile::default());
        Arc::get_mut(&mut r).expect("sole owner").type_name = "OtherType".to_string();

        reg.register_writer(Arc::clone(&w));
        reg.register_reader(Arc::clone(&r));

        assert_eq!(reg.match_state(&w.guid, &r.guid), MatchState::Unmatched);
        assert_eq!(w.status.get_inconsistent_topic().total_count, 1);
        assert_eq!(r.status.get_inconsistent_topic().total_count, 1);
    }

    #[test]
    fn test_unregister_reader_unmatches() {
        let reg = MatchRegistry::new();
        let w = writer_ep(1, "t", QosProfile::reliable());
        let r = reader_ep(2, "t", QosProfile::reliable());
        reg.register_writer(Arc::clone(&w));
        reg.register_reader(Arc::clone(&r));
        let _ = w.status.get_publication_matched();

        reg.unregister_reader(&r.guid);
        assert_eq!(reg.match_state(&w.guid, &r.guid), MatchState::Unmatched);
        let pm = w.status.get_publication_matched();
        assert_eq!(pm.current_count, 0);
        assert_eq!(pm.current_count_change, -1);
        assert_eq!(pm.total_count_change, 0);
        assert_eq!(w.reliable.reader_count(), 0);
    }

    #[test]
    fn test_unregister_writer_transitions_liveliness() {
        let reg = MatchRegistry::new();
        let qos = QosProfile::default().liveliness(Liveliness::automatic(Duration::from_secs(5)));
        let w = writer_ep(1, "t", qos);
        let r = reader_ep(2, "t", QosProfile::default());
        reg.register_writer(Arc::clone(&w));
        reg.register_reader(Arc::clone(&r));

        let s = r.status.get_liveliness_changed();
        assert_eq!(s.alive_count, 1);

        reg.unregister_writer(&w.guid);
        let s = r.status.get_liveliness_changed();
        assert_eq!(s.alive_count, 0);
        assert_eq!(s.alive_count_change, -1);
        assert_eq!(r.status.get_subscription_matched().current_count, 0);
    }

    #[test]
    fn test_transient_local_replay_on_late_join() {
        use crate::core::data::{SampleData, SampleDataKind};
        use crate::core::types::{KeyHash, Timestamp};
        use crate::dds::ReadMask;

        let reg = MatchRegistry::new();
        let qos = QosProfile::reliable().durability(Durability::TransientLocal);
        let w = writer_ep(1, "t", qos.clone());
        reg.register_writer(Arc::clone(&w));

        for seq in 1..=3 {
            let data = SampleData::from_wire(
                SampleDataKind::Data,
                vec![seq as u8],
                Vec::new(),
                KeyHash::NONE,
                Timestamp::from_nanos(seq as u64),
                0,
            );
            w.whc.insert(seq, data, Duration::ZERO).expect("insert");
        }

        let r = reader_ep(2, "t", qos);
        reg.register_reader(Arc::clone(&r));

        let got = r.rhc.read(64, ReadMask::any(), None);
        assert_eq!(got.len(), 3);
    }
}
