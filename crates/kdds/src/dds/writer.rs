// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Typed DataWriter over the writer history cache and the match registry.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::participant::ParticipantInner;
use super::status::{
    DeadlineMissedStatus, IncompatibleQosStatus, LivelinessLostStatus, PublicationMatchedStatus,
};
use super::{Error, QosProfile, Reliability, Result, StatusCondition};
use crate::core::data::{
    SampleData, SampleDataKind, TopicType, STATUSINFO_DISPOSE, STATUSINFO_UNREGISTER,
};
use crate::core::types::{mono_now, Guid, InstanceHandle, KeyHash, Timestamp};
use crate::dds::StatusRegistry;
use crate::matching::WriterEndpoint;
use crate::reliability::{ReliabilityConfig, ReliableWriter, RetransmitQueue};
use crate::whc::{WhcConfig, WriterHistoryCache};

struct WriterInstances {
    by_key: HashMap<KeyHash, InstanceHandle>,
    keys: HashMap<InstanceHandle, SampleData>,
}

/// Typed writer for one topic.
pub struct DataWriter<T: TopicType> {
    participant: Arc<ParticipantInner>,
    endpoint: Arc<WriterEndpoint>,
    instances: Mutex<WriterInstances>,
    next_instance: AtomicU64,
    /// Serializes the allocate-insert-deliver pipeline so publication
    /// order is preserved end-to-end.
    write_lock: Mutex<()>,
    closed: AtomicBool,
    _marker: PhantomData<fn() -> T>,
}

pub(crate) fn new_writer<T: TopicType>(
    participant: Arc<ParticipantInner>,
    guid: Guid,
    topic: &str,
    qos: QosProfile,
) -> DataWriter<T> {
    let status = Arc::new(StatusRegistry::new());
    let whc = Arc::new(WriterHistoryCache::new(WhcConfig::from_qos(&qos)));
    let reliable = Arc::new(ReliableWriter::new(guid, ReliabilityConfig::default()));
    let rexmit = Arc::new(RetransmitQueue::default());
    let endpoint = Arc::new(WriterEndpoint::new(
        guid,
        topic.to_string(),
        T::type_name().to_string(),
        qos,
        status,
        whc,
        reliable,
        rexmit,
    ));

    DataWriter {
        participant,
        endpoint,
        instances: Mutex::new(WriterInstances {
            by_key: HashMap::new(),
            keys: HashMap::new(),
        }),
        next_instance: AtomicU64::new(1),
        write_lock: Mutex::new(()),
        closed: AtomicBool::new(false),
        _marker: PhantomData,
    }
}

impl<T: TopicType> DataWriter<T> {
    pub(crate) fn endpoint_for_registry(&self) -> Arc<WriterEndpoint> {
        Arc::clone(&self.endpoint)
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.endpoint.guid
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.endpoint.topic
    }

    #[must_use]
    pub fn qos(&self) -> &QosProfile {
        &self.endpoint.qos
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::AlreadyDeleted);
        }
        Ok(())
    }

    fn intern_instance(&self, key_sample: &SampleData) -> InstanceHandle {
        let mut instances = self.instances.lock();
        let hash = key_sample.key_hash();
        if let Some(handle) = instances.by_key.get(&hash) {
            return *handle;
        }
        let handle = InstanceHandle(self.next_instance.fetch_add(1, Ordering::Relaxed));
        instances.by_key.insert(hash, handle);
        instances.keys.insert(handle, key_sample.clone());
        handle
    }

    /// Publish one sample through the WHC and fan it out to every matched
    /// reader. On `Timeout` nothing is delivered for this sample; samples
    /// written before it are kept.
    fn publish(&self, data: SampleData, handle: InstanceHandle) -> Result<()> {
        let _guard = self.write_lock.lock();
        let seq = self.endpoint.whc.next_seq();
        self.endpoint
            .whc
            .insert(seq, data.clone(), self.endpoint.qos.max_blocking_time)?;

        let now = mono_now();
        self.endpoint.record_write(handle, now);

        let mut all_reliable_acked = true;
        for reader in self.endpoint.matched.iter() {
            let accepted = reader.store_sample(self.endpoint.guid, seq, data.clone());
            if !accepted && matches!(reader.qos.reliability, Reliability::Reliable) {
                all_reliable_acked = false;
            }
        }
        if all_reliable_acked {
            self.endpoint.whc.remove_acked_messages(seq + 1);
        }

        self.participant.on_any_write(&self.endpoint.guid, now);
        Ok(())
    }

    /// Write a sample with the current system timestamp.
    ///
    /// # Errors
    ///
    /// `Error::Timeout` when the history cache blocks past
    /// `max_blocking_time`.
    pub fn write(&self, value: &T) -> Result<()> {
        self.write_with_timestamp(value, Timestamp::now())
    }

    /// Write a sample with an explicit source timestamp.
    ///
    /// # Errors
    ///
    /// See [`DataWriter::write`].
    pub fn write_with_timestamp(&self, value: &T, timestamp: Timestamp) -> Result<()> {
        self.ensure_open()?;
        let data = SampleData::from_sample(value, SampleDataKind::Data, timestamp)?;
        let key = SampleData::from_sample(value, SampleDataKind::Key, timestamp)?;
        let handle = self.intern_instance(&key);
        self.publish(data, handle)
    }

    /// Dispose the instance identified by `value`'s key fields.
    ///
    /// Disposing a never-written instance is permitted (it registers the
    /// instance as a side effect).
    ///
    /// # Errors
    ///
    /// See [`DataWriter::write`].
    pub fn dispose(&self, value: &T) -> Result<()> {
        self.dispose_with_timestamp(value, Timestamp::now())
    }

    /// Dispose with an explicit source timestamp.
    ///
    /// # Errors
    ///
    /// See [`DataWriter::write`].
    pub fn dispose_with_timestamp(&self, value: &T, timestamp: Timestamp) -> Result<()> {
        self.ensure_open()?;
        let key = SampleData::from_sample(value, SampleDataKind::Key, timestamp)?;
        let handle = self.intern_instance(&key);
        self.publish(key.with_statusinfo(STATUSINFO_DISPOSE), handle)
    }

    /// Write and dispose in one step.
    ///
    /// # Errors
    ///
    /// See [`DataWriter::write`].
    pub fn write_dispose_with_timestamp(&self, value: &T, timestamp: Timestamp) -> Result<()> {
        self.ensure_open()?;
        let data = SampleData::from_sample(value, SampleDataKind::Data, timestamp)?;
        let key = SampleData::from_sample(value, SampleDataKind::Key, timestamp)?;
        let handle = self.intern_instance(&key);
        self.publish(data.with_statusinfo(STATUSINFO_DISPOSE), handle)
    }

    /// Dispose by instance handle.
    ///
    /// # Errors
    ///
    /// `Error::BadParameter` for the nil handle;
    /// `Error::PreconditionNotMet` for a handle never registered here.
    pub fn dispose_instance(&self, handle: InstanceHandle) -> Result<()> {
        self.dispose_instance_with_timestamp(handle, Timestamp::now())
    }

    /// Dispose by instance handle with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// See [`DataWriter::dispose_instance`].
    pub fn dispose_instance_with_timestamp(
        &self,
        handle: InstanceHandle,
        timestamp: Timestamp,
    ) -> Result<()> {
        self.ensure_open()?;
        if handle.is_nil() {
            return Err(Error::BadParameter("nil instance handle".into()));
        }
        let key = {
            let instances = self.instances.lock();
            instances.keys.get(&handle).cloned().ok_or_else(|| {
                Error::PreconditionNotMet(format!("instance {} not registered", handle))
            })?
        };
        self.publish(
            key.with_timestamp(timestamp)
                .with_statusinfo(STATUSINFO_DISPOSE),
            handle,
        )
    }

    /// Unregister this writer from the instance. With
    /// `autodispose_unregistered` the instance is disposed as well.
    ///
    /// # Errors
    ///
    /// `Error::PreconditionNotMet` when the instance was never registered
    /// by this writer; reader/writer state is unchanged then.
    pub fn unregister_instance(&self, value: &T) -> Result<()> {
        self.unregister_instance_with_timestamp(value, Timestamp::now())
    }

    /// Unregister with an explicit source timestamp.
    ///
    /// # Errors
    ///
    /// See [`DataWriter::unregister_instance`].
    pub fn unregister_instance_with_timestamp(
        &self,
        value: &T,
        timestamp: Timestamp,
    ) -> Result<()> {
        self.ensure_open()?;
        let key = SampleData::from_sample(value, SampleDataKind::Key, timestamp)?;
        let handle = {
            let instances = self.instances.lock();
            instances.by_key.get(&key.key_hash()).copied()
        };
        let Some(handle) = handle else {
            return Err(Error::PreconditionNotMet(
                "unregister of an instance this writer never registered".into(),
            ));
        };

        let mut statusinfo = STATUSINFO_UNREGISTER;
        if self.endpoint.qos.autodispose_unregistered {
            statusinfo |= STATUSINFO_DISPOSE;
        }
        self.publish(key.with_statusinfo(statusinfo), handle)
    }

    /// Pre-register an instance, returning its writer-local handle.
    ///
    /// # Errors
    ///
    /// Propagates key-encoding failures.
    pub fn register_instance(&self, value: &T) -> Result<InstanceHandle> {
        self.ensure_open()?;
        let key = SampleData::from_sample(value, SampleDataKind::Key, Timestamp::now())?;
        Ok(self.intern_instance(&key))
    }

    /// Writer-local handle for a key, if registered.
    #[must_use]
    pub fn lookup_instance(&self, value: &T) -> Option<InstanceHandle> {
        let key = SampleData::from_sample(value, SampleDataKind::Key, Timestamp::now()).ok()?;
        self.instances.lock().by_key.get(&key.key_hash()).copied()
    }

    /// Renew this writer's liveliness (manual-by-topic mechanism).
    ///
    /// # Errors
    ///
    /// `Error::AlreadyDeleted` after `close`.
    pub fn assert_liveliness(&self) -> Result<()> {
        self.ensure_open()?;
        self.participant
            .assert_writer_liveliness(&self.endpoint.guid, mono_now())
    }

    // ========================================================================
    // Status surface
    // ========================================================================

    #[must_use]
    pub fn get_publication_matched_status(&self) -> PublicationMatchedStatus {
        self.endpoint.status.get_publication_matched()
    }

    #[must_use]
    pub fn take_publication_matched_status(&self) -> PublicationMatchedStatus {
        self.endpoint.status.take_publication_matched()
    }

    #[must_use]
    pub fn get_liveliness_lost_status(&self) -> LivelinessLostStatus {
        self.endpoint.status.get_liveliness_lost()
    }

    #[must_use]
    pub fn get_offered_deadline_missed_status(&self) -> DeadlineMissedStatus {
        self.endpoint.status.get_offered_deadline_missed()
    }

    #[must_use]
    pub fn get_offered_incompatible_qos_status(&self) -> IncompatibleQosStatus {
        self.endpoint.status.get_offered_incompatible_qos()
    }

    #[must_use]
    pub fn get_inconsistent_topic_status(&self) -> super::InconsistentTopicStatus {
        self.endpoint.status.get_inconsistent_topic()
    }

    #[must_use]
    pub fn get_status_condition(&self) -> Arc<StatusCondition> {
        self.endpoint.status.condition()
    }

    // ========================================================================
    // Mutable QoS subset
    // ========================================================================

    /// The user-data blob currently offered. `None` means absent,
    /// `Some(vec![])` present-and-empty - the two are never confused.
    #[must_use]
    pub fn user_data(&self) -> Option<Vec<u8>> {
        self.endpoint.mutable_qos().user_data.clone()
    }

    pub fn set_user_data(&self, user_data: Option<Vec<u8>>) {
        let mut mutable = (*self.endpoint.mutable_qos()).clone();
        mutable.user_data = user_data;
        self.endpoint.set_mutable_qos(mutable);
    }

    /// Update the ownership strength (meaningful under EXCLUSIVE).
    pub fn set_ownership_strength(&self, strength: i32) {
        let mut mutable = (*self.endpoint.mutable_qos()).clone();
        mutable.ownership_strength = strength;
        self.endpoint.set_mutable_qos(mutable);
    }

    /// Update the offered deadline period.
    pub fn set_deadline(&self, period: std::time::Duration) {
        let mut mutable = (*self.endpoint.mutable_qos()).clone();
        mutable.deadline = super::Deadline::new(period);
        self.endpoint.set_mutable_qos(mutable);
    }

    /// Delete the writer: matched readers observe the unmatch and the
    /// writer's instances lose a registered writer.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.participant
            .registry()
            .unregister_writer(&self.endpoint.guid);
        self.participant.liveliness.remove_writer(&self.endpoint.guid);
        self.participant.forget_child(&self.endpoint.guid);
    }
}

impl<T: TopicType> Drop for DataWriter<T> {
    fn drop(&mut self) {
        self.close();
    }
}
