// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Typed DataReader over the reader history cache.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::participant::ParticipantInner;
use super::status::{
    DeadlineMissedStatus, IncompatibleQosStatus, LivelinessChangedStatus, SampleLostStatus,
    SampleRejectedStatus, SubscriptionMatchedStatus,
};
use super::{
    Error, QosProfile, QueryCondition, ReadCondition, ReadMask, Result, StatusCondition,
};
use crate::core::data::{SampleData, SampleDataKind, TopicType};
use crate::core::types::{Guid, InstanceHandle, Timestamp};
use crate::dds::read_condition::QueryFilter;
use crate::dds::StatusRegistry;
use crate::matching::ReaderEndpoint;
use crate::rhc::{ReaderHistoryCache, RhcConfig, SampleInfo};

/// One sample returned by read/take/peek.
///
/// `value` decodes the payload for valid samples and rebuilds key fields
/// only (everything else defaulted) for invalid ones.
#[derive(Debug)]
pub struct Sample<T> {
    pub info: SampleInfo,
    pub value: Option<T>,
}

/// Typed reader for one topic.
pub struct DataReader<T: TopicType> {
    participant: Arc<ParticipantInner>,
    endpoint: Arc<ReaderEndpoint>,
    closed: AtomicBool,
    _marker: PhantomData<fn() -> T>,
}

pub(crate) fn new_reader<T: TopicType>(
    participant: Arc<ParticipantInner>,
    guid: Guid,
    topic: &str,
    qos: QosProfile,
) -> DataReader<T> {
    let status = Arc::new(StatusRegistry::new());
    let rhc = Arc::new(ReaderHistoryCache::new(
        RhcConfig::from_qos(&qos),
        Arc::clone(&status),
    ));
    let endpoint = Arc::new(ReaderEndpoint::new(
        guid,
        topic.to_string(),
        T::type_name().to_string(),
        qos,
        status,
        rhc,
    ));

    DataReader {
        participant,
        endpoint,
        closed: AtomicBool::new(false),
        _marker: PhantomData,
    }
}

impl<T: TopicType> DataReader<T> {
    pub(crate) fn endpoint_for_registry(&self) -> Arc<ReaderEndpoint> {
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

    fn to_samples(raw: Vec<(SampleInfo, SampleData)>) -> Vec<Sample<T>> {
        raw.into_iter()
            .map(|(info, data)| Sample {
                value: data.to_sample::<T>().ok(),
                info,
            })
            .collect()
    }

    // ========================================================================
    // Read family
    // ========================================================================

    /// Non-destructive read; returned samples transition to READ.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyDeleted` after `close`.
    pub fn read(&self, max_samples: usize) -> Result<Vec<Sample<T>>> {
        self.read_mask(max_samples, ReadMask::any())
    }

    /// Read restricted by a state mask.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyDeleted` after `close`.
    pub fn read_mask(&self, max_samples: usize, mask: ReadMask) -> Result<Vec<Sample<T>>> {
        self.ensure_open()?;
        Ok(Self::to_samples(
            self.endpoint.rhc.read(max_samples, mask, None),
        ))
    }

    /// Destructive counterpart of `read`.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyDeleted` after `close`.
    pub fn take(&self, max_samples: usize) -> Result<Vec<Sample<T>>> {
        self.take_mask(max_samples, ReadMask::any())
    }

    /// Take restricted by a state mask.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyDeleted` after `close`.
    pub fn take_mask(&self, max_samples: usize, mask: ReadMask) -> Result<Vec<Sample<T>>> {
        self.ensure_open()?;
        Ok(Self::to_samples(
            self.endpoint.rhc.take(max_samples, mask, None),
        ))
    }

    /// Like `read` but mutating neither sample-state nor view-state.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyDeleted` after `close`.
    pub fn peek(&self, max_samples: usize) -> Result<Vec<Sample<T>>> {
        self.peek_mask(max_samples, ReadMask::any())
    }

    /// Peek restricted by a state mask.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyDeleted` after `close`.
    pub fn peek_mask(&self, max_samples: usize, mask: ReadMask) -> Result<Vec<Sample<T>>> {
        self.ensure_open()?;
        Ok(Self::to_samples(
            self.endpoint.rhc.peek(max_samples, mask, None),
        ))
    }

    /// Read scoped to one instance.
    ///
    /// # Errors
    ///
    /// `Error::PreconditionNotMet` for an unknown handle.
    pub fn read_instance(
        &self,
        handle: InstanceHandle,
        max_samples: usize,
        mask: ReadMask,
    ) -> Result<Vec<Sample<T>>> {
        self.ensure_open()?;
        Ok(Self::to_samples(self.endpoint.rhc.read_instance(
            handle,
            max_samples,
            mask,
        )?))
    }

    /// Take scoped to one instance.
    ///
    /// # Errors
    ///
    /// `Error::PreconditionNotMet` for an unknown handle.
    pub fn take_instance(
        &self,
        handle: InstanceHandle,
        max_samples: usize,
        mask: ReadMask,
    ) -> Result<Vec<Sample<T>>> {
        self.ensure_open()?;
        Ok(Self::to_samples(self.endpoint.rhc.take_instance(
            handle,
            max_samples,
            mask,
        )?))
    }

    /// Stream matching samples to a collector.
    ///
    /// A negative collector return aborts with that code unless at least
    /// one sample was already collected, in which case the count of
    /// collected samples is returned.
    pub fn read_with_collector(
        &self,
        max_samples: usize,
        mask: ReadMask,
        mut collector: impl FnMut(&SampleInfo, Option<T>) -> i32,
    ) -> i32 {
        self.endpoint
            .rhc
            .read_with_collector(max_samples, mask, None, &mut |info, data| {
                collector(info, data.to_sample::<T>().ok())
            })
    }

    /// Read through a read/query condition (its mask plus filter).
    ///
    /// # Errors
    ///
    /// `Error::AlreadyDeleted` after `close`.
    pub fn read_with_condition(
        &self,
        condition: &ReadCondition,
        max_samples: usize,
    ) -> Result<Vec<Sample<T>>> {
        self.ensure_open()?;
        let filter = condition.filter().map(Arc::clone);
        Ok(Self::to_samples(self.endpoint.rhc.read(
            max_samples,
            condition.mask(),
            filter.as_deref(),
        )))
    }

    /// Take through a read/query condition.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyDeleted` after `close`.
    pub fn take_with_condition(
        &self,
        condition: &ReadCondition,
        max_samples: usize,
    ) -> Result<Vec<Sample<T>>> {
        self.ensure_open()?;
        let filter = condition.filter().map(Arc::clone);
        Ok(Self::to_samples(self.endpoint.rhc.take(
            max_samples,
            condition.mask(),
            filter.as_deref(),
        )))
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Reader-local handle for a key; stable until the instance is
    /// destroyed.
    #[must_use]
    pub fn lookup_instance(&self, value: &T) -> Option<InstanceHandle> {
        let key = SampleData::from_sample(value, SampleDataKind::Key, Timestamp::now()).ok()?;
        self.endpoint.rhc.lookup_instance(&key.key_hash())
    }

    /// Pre-allocate the instance handle for a key. Idempotent with
    /// `lookup_instance` while the instance is alive.
    ///
    /// # Errors
    ///
    /// `Error::OutOfResources` at the instance limit.
    pub fn register_instance(&self, value: &T) -> Result<InstanceHandle> {
        self.ensure_open()?;
        let key = SampleData::from_sample(value, SampleDataKind::Key, Timestamp::now())?;
        self.endpoint.rhc.register_instance(key)
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    /// Create a read condition over this reader's cache.
    #[must_use]
    pub fn create_read_condition(&self, mask: ReadMask) -> Arc<ReadCondition> {
        let condition = Arc::new(ReadCondition::new(mask));
        self.endpoint.rhc.attach_condition(Arc::clone(&condition));
        condition
    }

    /// Create a query condition: mask plus a typed content predicate.
    ///
    /// The predicate also runs on invalid samples, seeing a key-only value
    /// with non-key fields defaulted; it must tolerate that.
    #[must_use]
    pub fn create_query_condition(
        &self,
        mask: ReadMask,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Arc<QueryCondition> {
        let filter: Arc<QueryFilter> = Arc::new(move |data: &SampleData| {
            data.to_sample::<T>().map(|v| predicate(&v)).unwrap_or(false)
        });
        let inner = Arc::new(ReadCondition::with_filter(mask, filter));
        self.endpoint.rhc.attach_condition(Arc::clone(&inner));
        Arc::new(QueryCondition::from_inner(inner))
    }

    /// Detach a previously created condition.
    pub fn delete_condition(&self, condition_id: u64) {
        self.endpoint.rhc.detach_condition(condition_id);
    }

    // ========================================================================
    // Status surface
    // ========================================================================

    #[must_use]
    pub fn get_subscription_matched_status(&self) -> SubscriptionMatchedStatus {
        self.endpoint.status.get_subscription_matched()
    }

    #[must_use]
    pub fn take_subscription_matched_status(&self) -> SubscriptionMatchedStatus {
        self.endpoint.status.take_subscription_matched()
    }

    #[must_use]
    pub fn get_liveliness_changed_status(&self) -> LivelinessChangedStatus {
        self.endpoint.status.get_liveliness_changed()
    }

    #[must_use]
    pub fn get_sample_lost_status(&self) -> SampleLostStatus {
        self.endpoint.status.get_sample_lost()
    }

    #[must_use]
    pub fn get_sample_rejected_status(&self) -> SampleRejectedStatus {
        self.endpoint.status.get_sample_rejected()
    }

    #[must_use]
    pub fn get_requested_deadline_missed_status(&self) -> DeadlineMissedStatus {
        self.endpoint.status.get_requested_deadline_missed()
    }

    #[must_use]
    pub fn get_requested_incompatible_qos_status(&self) -> IncompatibleQosStatus {
        self.endpoint.status.get_requested_incompatible_qos()
    }

    /// The user-data blob currently requested. `None` means absent,
    /// `Some(vec![])` present-and-empty.
    #[must_use]
    pub fn user_data(&self) -> Option<Vec<u8>> {
        self.endpoint.mutable_qos().user_data.clone()
    }

    pub fn set_user_data(&self, user_data: Option<Vec<u8>>) {
        let mut mutable = (*self.endpoint.mutable_qos()).clone();
        mutable.user_data = user_data;
        self.endpoint.set_mutable_qos(mutable);
    }

    /// Update the requested deadline period.
    pub fn set_deadline(&self, period: std::time::Duration) {
        let mut mutable = (*self.endpoint.mutable_qos()).clone();
        mutable.deadline = super::Deadline::new(period);
        self.endpoint.set_mutable_qos(mutable);
    }

    #[must_use]
    pub fn get_inconsistent_topic_status(&self) -> super::InconsistentTopicStatus {
        self.endpoint.status.get_inconsistent_topic()
    }

    #[must_use]
    pub fn get_status_condition(&self) -> Arc<StatusCondition> {
        self.endpoint.status.condition()
    }

    /// Delete the reader: matched writers observe the unmatch.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.participant
            .registry()
            .unregister_reader(&self.endpoint.guid);
        self.participant.forget_child(&self.endpoint.guid);
    }
}

impl<T: TopicType> Drop for DataReader<T> {
    fn drop(&mut self) {
        self.close();
    }
}
