// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Domain participant: entity factory, timed-event worker, and the
//! participant-level liveliness machinery (PMD ticks, lease sweeps,
//! deadline sweeps).
//!
//! Participants in one process sharing a domain id share a match
//! registry, which stands in for discovery: creating an endpoint is the
//! match event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Error, QosProfile, Result};
use crate::core::data::TopicType;
use crate::core::types::{mono_now, EntityId, Guid, MonoTime};
use crate::matching::{MatchRegistry, ParticipantLiveliness, ReaderEndpoint, WriterEndpoint};
use crate::protocol::constants::ENTITYID_PARTICIPANT;
use crate::sched::{EventDisposition, EventQueue};

/// Housekeeping cadence: lease expiry, deadline sweeps, PMD emission.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_millis(4);
/// Floor for the PMD interval.
const PMD_FLOOR: Duration = Duration::from_millis(10);
/// Deadline grid for the timed-event queue.
const EVENT_ROUNDING: Duration = Duration::from_micros(100);

fn domains() -> &'static Mutex<HashMap<u32, Weak<MatchRegistry>>> {
    static DOMAINS: OnceLock<Mutex<HashMap<u32, Weak<MatchRegistry>>>> = OnceLock::new();
    DOMAINS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn registry_for_domain(domain_id: u32) -> Arc<MatchRegistry> {
    let mut domains = domains().lock();
    if let Some(registry) = domains.get(&domain_id).and_then(Weak::upgrade) {
        return registry;
    }
    let registry = Arc::new(MatchRegistry::new());
    domains.insert(domain_id, Arc::downgrade(&registry));
    registry
}

/// Entity kinds created under a participant, in creation-order records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Writer,
    Reader,
}

pub(crate) struct ParticipantInner {
    guid: Guid,
    registry: Arc<MatchRegistry>,
    events: Arc<EventQueue>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pub(crate) liveliness: Arc<ParticipantLiveliness>,
    /// Entities in creation order; cleanup runs in reverse.
    children: Mutex<Vec<(Guid, EntityKind)>>,
    next_pmd: Mutex<MonoTime>,
    entity_counter: AtomicU32,
    closed: AtomicBool,
}

impl ParticipantInner {
    pub(crate) fn registry(&self) -> &Arc<MatchRegistry> {
        &self.registry
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn alloc_entity_id(&self, kind_octet: u8) -> EntityId {
        let n = self.entity_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let [_, b1, b2, b3] = n.to_be_bytes();
        [b1, b2, b3, kind_octet]
    }

    /// Renew one writer's liveliness at every matched reader.
    pub(crate) fn fan_out_renewal(&self, writer: &Guid, now: MonoTime) {
        if let Some(endpoint) = self.registry.writer(writer) {
            for reader in endpoint.matched.iter() {
                reader.leases.renew(writer, now);
            }
        }
    }

    /// A write happened on `writer`: renews that writer and (per
    /// MANUAL_BY_PARTICIPANT semantics) every MBP writer of this
    /// participant.
    pub(crate) fn on_any_write(&self, writer: &Guid, now: MonoTime) {
        if self.liveliness.assert_writer(writer, now) {
            self.fan_out_renewal(writer, now);
        }
        for mbp_writer in self.liveliness.assert_participant(now) {
            if mbp_writer != *writer {
                self.fan_out_renewal(&mbp_writer, now);
            }
        }
    }

    /// Renew exactly one writer (writer-level `assert_liveliness`).
    pub(crate) fn assert_writer_liveliness(&self, writer: &Guid, now: MonoTime) -> Result<()> {
        if !self.liveliness.assert_writer(writer, now) {
            return Err(Error::AlreadyDeleted);
        }
        self.fan_out_renewal(writer, now);
        Ok(())
    }

    fn track_child(&self, guid: Guid, kind: EntityKind) {
        self.children.lock().push((guid, kind));
    }

    pub(crate) fn track_writer(&self, guid: Guid) {
        self.track_child(guid, EntityKind::Writer);
    }

    pub(crate) fn track_reader(&self, guid: Guid) {
        self.track_child(guid, EntityKind::Reader);
    }

    pub(crate) fn forget_child(&self, guid: &Guid) {
        self.children.lock().retain(|(g, _)| g != guid);
    }

    fn housekeeping(self: &Arc<Self>, now: MonoTime) {
        // Writer-side: manual writers missing their own lease.
        for writer in self.liveliness.check_lost(now) {
            if let Some(endpoint) = self.registry.writer(&writer) {
                endpoint.status.push_liveliness_lost();
            }
        }

        // PMD emission: automatic writers renew at min(lease) * 0.8.
        {
            let mut next_pmd = self.next_pmd.lock();
            if now >= *next_pmd {
                let interval = self.liveliness.pmd_interval().unwrap_or(Duration::from_secs(1));
                *next_pmd =
                    now.saturating_add(crate::core::types::duration_to_nanos(interval));
                drop(next_pmd);
                for writer in self.liveliness.automatic_tick(now) {
                    self.fan_out_renewal(&writer, now);
                }
            }
        }

        // Per-endpoint sweeps: lease expiry and both deadline sides.
        let children = self.children.lock().clone();
        for (guid, kind) in children {
            match kind {
                EntityKind::Reader => {
                    if let Some(reader) = self.registry.reader(&guid) {
                        reader.check_liveliness(now);
                        reader.check_deadlines(now);
                    }
                }
                EntityKind::Writer => {
                    if let Some(writer) = self.registry.writer(&guid) {
                        writer.check_deadlines(now);
                    }
                }
            }
        }
    }

    fn close(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Children clean up in reverse creation order.
        let children: Vec<(Guid, EntityKind)> = {
            let mut guard = self.children.lock();
            guard.drain(..).rev().collect()
        };
        for (guid, kind) in children {
            match kind {
                EntityKind::Writer => {
                    self.registry.unregister_writer(&guid);
                    self.liveliness.remove_writer(&guid);
                }
                EntityKind::Reader => self.registry.unregister_reader(&guid),
            }
        }

        // Drain timed events before the worker goes away.
        self.events.shutdown();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                log::debug!("[Participant::close] event worker panicked");
            }
        }
    }
}

/// Entry point to a DDS domain: factory for writers and readers.
pub struct Participant {
    pub(crate) inner: Arc<ParticipantInner>,
}

impl Participant {
    /// Create a participant in domain 0.
    #[must_use]
    pub fn new() -> Self {
        Self::with_domain_id(0)
    }

    /// Create a participant in the given domain.
    #[must_use]
    pub fn with_domain_id(domain_id: u32) -> Self {
        let guid = Guid::new(Guid::fresh_prefix(), ENTITYID_PARTICIPANT);
        let inner = Arc::new(ParticipantInner {
            guid,
            registry: registry_for_domain(domain_id),
            events: Arc::new(EventQueue::new(EVENT_ROUNDING)),
            worker: Mutex::new(None),
            liveliness: Arc::new(ParticipantLiveliness::new(PMD_FLOOR)),
            children: Mutex::new(Vec::new()),
            next_pmd: Mutex::new(0),
            entity_counter: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        });

        // Housekeeping heartbeat on the timed-event queue.
        {
            let weak = Arc::downgrade(&inner);
            let interval = crate::core::types::duration_to_nanos(HOUSEKEEPING_INTERVAL);
            inner.events.schedule(
                mono_now(),
                Box::new(move |now| match weak.upgrade() {
                    Some(participant) => {
                        participant.housekeeping(now);
                        EventDisposition::ResumeAt(now + interval)
                    }
                    None => EventDisposition::Done,
                }),
            );
        }

        let worker = {
            let events = Arc::clone(&inner.events);
            std::thread::Builder::new()
                .name("kdds-events".to_string())
                .spawn(move || events.run_worker())
        };
        match worker {
            Ok(handle) => *inner.worker.lock() = Some(handle),
            Err(err) => log::warn!("[Participant::new] failed to spawn event worker: {}", err),
        }

        Self { inner }
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.inner.guid
    }

    /// Create a typed writer on `topic`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidQos` for inconsistent policies;
    /// `Error::AlreadyDeleted` after `close`.
    pub fn create_writer<T: TopicType>(
        &self,
        topic: &str,
        qos: QosProfile,
    ) -> Result<super::DataWriter<T>> {
        if self.inner.is_closed() {
            return Err(Error::AlreadyDeleted);
        }
        qos.validate().map_err(Error::InvalidQos)?;

        let guid = Guid::new(self.inner.guid.prefix, self.inner.alloc_entity_id(0x02));
        let writer = super::writer::new_writer::<T>(Arc::clone(&self.inner), guid, topic, qos);
        self.inner.track_writer(guid);
        self.inner
            .liveliness
            .add_writer(guid, &writer.qos().liveliness, mono_now());
        self.inner
            .registry
            .register_writer(writer.endpoint_for_registry());
        Ok(writer)
    }

    /// Create a typed reader on `topic`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidQos` for inconsistent policies;
    /// `Error::AlreadyDeleted` after `close`.
    pub fn create_reader<T: TopicType>(
        &self,
        topic: &str,
        qos: QosProfile,
    ) -> Result<super::DataReader<T>> {
        if self.inner.is_closed() {
            return Err(Error::AlreadyDeleted);
        }
        qos.validate().map_err(Error::InvalidQos)?;

        let guid = Guid::new(self.inner.guid.prefix, self.inner.alloc_entity_id(0x07));
        let reader = super::reader::new_reader::<T>(Arc::clone(&self.inner), guid, topic, qos);
        self.inner.track_reader(guid);
        self.inner
            .registry
            .register_reader(reader.endpoint_for_registry());
        Ok(reader)
    }

    /// Renew every manual-by-participant writer owned by this participant.
    pub fn assert_liveliness(&self) {
        let now = mono_now();
        for writer in self.inner.liveliness.assert_participant(now) {
            self.inner.fan_out_renewal(&writer, now);
        }
    }

    /// Delete the participant: children clean up in reverse creation
    /// order, pending timed events are cancelled, the worker joins.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Default for Participant {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.inner.close();
    }
}
