// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Per-entity communication statuses.
//!
//! Every status carries cumulative counters plus `*_change` deltas since
//! the last read. `get_*` resets the deltas and clears the entity's
//! active-status bit; `take_*` additionally clears the listener-dispatch
//! bit. The active bits feed the entity's `StatusCondition`.

use std::sync::Arc;

use parking_lot::Mutex;

use super::condition::{StatusCondition, StatusMask};
use crate::core::types::{Guid, InstanceHandle};

// ============================================================================
// Policy ids (incompatible-QoS reporting)
// ============================================================================

/// Identifies the QoS policy that caused an incompatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyId {
    #[default]
    Invalid,
    Reliability,
    Durability,
    Deadline,
    Liveliness,
    Ownership,
    DestinationOrder,
}

// ============================================================================
// Status structs
// ============================================================================

/// Status information for publication matching events.
#[derive(Debug, Clone, Default)]
pub struct PublicationMatchedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub current_count: u32,
    pub current_count_change: i32,
    pub last_subscription_handle: Option<Guid>,
}

/// Status information for subscription matching events.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionMatchedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub current_count: u32,
    pub current_count_change: i32,
    pub last_publication_handle: Option<Guid>,
}

/// Status information for liveliness changes observed by a reader.
#[derive(Debug, Clone, Default)]
pub struct LivelinessChangedStatus {
    pub alive_count: u32,
    pub alive_count_change: i32,
    pub not_alive_count: u32,
    pub not_alive_count_change: i32,
    pub last_publication_handle: Option<Guid>,
}

/// Status information for a writer losing its own liveliness.
#[derive(Debug, Clone, Default)]
pub struct LivelinessLostStatus {
    pub total_count: u32,
    pub total_count_change: i32,
}

/// Status information for sample lost events.
#[derive(Debug, Clone, Default)]
pub struct SampleLostStatus {
    pub total_count: u32,
    pub total_count_change: i32,
}

/// Reason why a sample was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleRejectedReason {
    #[default]
    NotRejected,
    RejectedBySamplesLimit,
    RejectedByInstancesLimit,
    RejectedBySamplesPerInstanceLimit,
}

/// Status information for sample rejected events.
#[derive(Debug, Clone, Default)]
pub struct SampleRejectedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub last_reason: SampleRejectedReason,
    pub last_instance_handle: Option<InstanceHandle>,
}

/// Status information for missed deadlines (offered or requested side).
#[derive(Debug, Clone, Default)]
pub struct DeadlineMissedStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub last_instance_handle: Option<InstanceHandle>,
}

/// Requested-side deadline status (reader).
pub type RequestedDeadlineMissedStatus = DeadlineMissedStatus;

/// Status information for incompatible QoS (offered or requested side).
#[derive(Debug, Clone, Default)]
pub struct IncompatibleQosStatus {
    pub total_count: u32,
    pub total_count_change: i32,
    pub last_policy_id: PolicyId,
}

/// Status information for inconsistent topic definitions.
#[derive(Debug, Clone, Default)]
pub struct InconsistentTopicStatus {
    pub total_count: u32,
    pub total_count_change: i32,
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
struct StatusData {
    publication_matched: PublicationMatchedStatus,
    subscription_matched: SubscriptionMatchedStatus,
    liveliness_changed: LivelinessChangedStatus,
    liveliness_lost: LivelinessLostStatus,
    sample_lost: SampleLostStatus,
    sample_rejected: SampleRejectedStatus,
    offered_deadline_missed: DeadlineMissedStatus,
    requested_deadline_missed: DeadlineMissedStatus,
    offered_incompatible_qos: IncompatibleQosStatus,
    requested_incompatible_qos: IncompatibleQosStatus,
    inconsistent_topic: InconsistentTopicStatus,
    /// Bits with a pending listener dispatch; `take_*` clears them.
    listener_pending: StatusMask,
}

/// Per-entity status store wired to the entity's `StatusCondition`.
pub struct StatusRegistry {
    condition: Arc<StatusCondition>,
    data: Mutex<StatusData>,
}

impl StatusRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            condition: Arc::new(StatusCondition::new()),
            data: Mutex::new(StatusData::default()),
        }
    }

    /// The entity's status condition (attachable to a waitset).
    #[must_use]
    pub fn condition(&self) -> Arc<StatusCondition> {
        Arc::clone(&self.condition)
    }

    fn raise(&self, data: &mut StatusData, bit: StatusMask) {
        data.listener_pending = data.listener_pending | bit;
        self.condition.raise(bit);
    }

    fn settle(&self, data: &mut StatusData, bit: StatusMask, take: bool) {
        self.condition.retract(bit);
        if take {
            data.listener_pending = data.listener_pending.without(bit);
        }
    }

    // ========================================================================
    // Push side (kernel-internal)
    // ========================================================================

    pub(crate) fn push_publication_match(&self, reader: Guid) {
        let mut data = self.data.lock();
        let s = &mut data.publication_matched;
        s.total_count += 1;
        s.total_count_change += 1;
        s.current_count += 1;
        s.current_count_change += 1;
        s.last_subscription_handle = Some(reader);
        self.raise(&mut data, StatusMask::PUBLICATION_MATCHED);
    }

    pub(crate) fn push_publication_unmatch(&self, reader: Guid) {
        let mut data = self.data.lock();
        let s = &mut data.publication_matched;
        s.current_count = s.current_count.saturating_sub(1);
        s.current_count_change -= 1;
        s.last_subscription_handle = Some(reader);
        self.raise(&mut data, StatusMask::PUBLICATION_MATCHED);
    }

    pub(crate) fn push_subscription_match(&self, writer: Guid) {
        let mut data = self.data.lock();
        let s = &mut data.subscription_matched;
        s.total_count += 1;
        s.total_count_change += 1;
        s.current_count += 1;
        s.current_count_change += 1;
        s.last_publication_handle = Some(writer);
        self.raise(&mut data, StatusMask::SUBSCRIPTION_MATCHED);
    }

    pub(crate) fn push_subscription_unmatch(&self, writer: Guid) {
        let mut data = self.data.lock();
        let s = &mut data.subscription_matched;
        s.current_count = s.current_count.saturating_sub(1);
        s.current_count_change -= 1;
        s.last_publication_handle = Some(writer);
        self.raise(&mut data, StatusMask::SUBSCRIPTION_MATCHED);
    }

    /// `alive_delta`/`not_alive_delta` are +-1 per transition; a writer
    /// leaving while alive is `(-1, 0)`.
    pub(crate) fn push_liveliness_changed(
        &self,
        alive_delta: i32,
        not_alive_delta: i32,
        writer: Guid,
    ) {
        let mut data = self.data.lock();
        let s = &mut data.liveliness_changed;
        s.alive_count = s.alive_count.saturating_add_signed(alive_delta);
        s.alive_count_change += alive_delta;
        s.not_alive_count = s.not_alive_count.saturating_add_signed(not_alive_delta);
        s.not_alive_count_change += not_alive_delta;
        s.last_publication_handle = Some(writer);
        self.raise(&mut data, StatusMask::LIVELINESS_CHANGED);
    }

    pub(crate) fn push_liveliness_lost(&self) {
        let mut data = self.data.lock();
        data.liveliness_lost.total_count += 1;
        data.liveliness_lost.total_count_change += 1;
        self.raise(&mut data, StatusMask::LIVELINESS_LOST);
    }

    pub(crate) fn push_sample_lost(&self) {
        let mut data = self.data.lock();
        data.sample_lost.total_count += 1;
        data.sample_lost.total_count_change += 1;
        self.raise(&mut data, StatusMask::SAMPLE_LOST);
    }

    pub(crate) fn push_sample_rejected(
        &self,
        reason: SampleRejectedReason,
        instance: Option<InstanceHandle>,
    ) {
        let mut data = self.data.lock();
        let s = &mut data.sample_rejected;
        s.total_count += 1;
        s.total_count_change += 1;
        s.last_reason = reason;
        s.last_instance_handle = instance;
        self.raise(&mut data, StatusMask::SAMPLE_REJECTED);
    }

    pub(crate) fn push_offered_deadline_missed(&self, instance: InstanceHandle) {
        let mut data = self.data.lock();
        let s = &mut data.offered_deadline_missed;
        s.total_count += 1;
        s.total_count_change += 1;
        s.last_instance_handle = Some(instance);
        self.raise(&mut data, StatusMask::OFFERED_DEADLINE_MISSED);
    }

    pub(crate) fn push_requested_deadline_missed(&self, instance: InstanceHandle) {
        let mut data = self.data.lock();
        let s = &mut data.requested_deadline_missed;
        s.total_count += 1;
        s.total_count_change += 1;
        s.last_instance_handle = Some(instance);
        self.raise(&mut data, StatusMask::REQUESTED_DEADLINE_MISSED);
    }

    /// The first offending policy encountered wins `last_policy_id`.
    pub(crate) fn push_offered_incompatible_qos(&self, policy: PolicyId) {
        let mut data = self.data.lock();
        let s = &mut data.offered_incompatible_qos;
        s.total_count += 1;
        s.total_count_change += 1;
        s.last_policy_id = policy;
        self.raise(&mut data, StatusMask::OFFERED_INCOMPATIBLE_QOS);
    }

    pub(crate) fn push_requested_incompatible_qos(&self, policy: PolicyId) {
        let mut data = self.data.lock();
        let s = &mut data.requested_incompatible_qos;
        s.total_count += 1;
        s.total_count_change += 1;
        s.last_policy_id = policy;
        self.raise(&mut data, StatusMask::REQUESTED_INCOMPATIBLE_QOS);
    }

    pub(crate) fn push_inconsistent_topic(&self) {
        let mut data = self.data.lock();
        data.inconsistent_topic.total_count += 1;
        data.inconsistent_topic.total_count_change += 1;
        self.raise(&mut data, StatusMask::INCONSISTENT_TOPIC);
    }

    pub(crate) fn push_data_available(&self) {
        let mut data = self.data.lock();
        self.raise(&mut data, StatusMask::DATA_AVAILABLE);
    }

    /// Cleared on read/take of actual data, not via a getter.
    pub(crate) fn clear_data_available(&self) {
        self.condition.retract(StatusMask::DATA_AVAILABLE);
    }

    // ========================================================================
    // Read side (public, via the entity wrappers)
    // ========================================================================

    fn read_publication_matched(&self, take: bool) -> PublicationMatchedStatus {
        let mut data = self.data.lock();
        let out = data.publication_matched.clone();
        data.publication_matched.total_count_change = 0;
        data.publication_matched.current_count_change = 0;
        self.settle(&mut data, StatusMask::PUBLICATION_MATCHED, take);
        out
    }

    #[must_use]
    pub fn get_publication_matched(&self) -> PublicationMatchedStatus {
        self.read_publication_matched(false)
    }

    #[must_use]
    pub fn take_publication_matched(&self) -> PublicationMatchedStatus {
        self.read_publication_matched(true)
    }

    fn read_subscription_matched(&self, take: bool) -> SubscriptionMatchedStatus {
        let mut data = self.data.lock();
        let out = data.subscription_matched.clone();
        data.subscription_matched.total_count_change = 0;
        data.subscription_matched.current_count_change = 0;
        self.settle(&mut data, StatusMask::SUBSCRIPTION_MATCHED, take);
        out
    }

    #[must_use]
    pub fn get_subscription_matched(&self) -> SubscriptionMatchedStatus {
        self.read_subscription_matched(false)
    }

    #[must_use]
    pub fn take_subscription_matched(&self) -> SubscriptionMatchedStatus {
        self.read_subscription_matched(true)
    }

    #[must_use]
    pub fn get_liveliness_changed(&self) -> LivelinessChangedStatus {
        let mut data = self.data.lock();
        let out = data.liveliness_changed.clone();
        data.liveliness_changed.alive_count_change = 0;
        data.liveliness_changed.not_alive_count_change = 0;
        self.settle(&mut data, StatusMask::LIVELINESS_CHANGED, false);
        out
    }

    #[must_use]
    pub fn get_liveliness_lost(&self) -> LivelinessLostStatus {
        let mut data = self.data.lock();
        let out = data.liveliness_lost.clone();
        data.liveliness_lost.total_count_change = 0;
        self.settle(&mut data, StatusMask::LIVELINESS_LOST, false);
        out
    }

    #[must_use]
    pub fn get_sample_lost(&self) -> SampleLostStatus {
        let mut data = self.data.lock();
        let out = data.sample_lost.clone();
        data.sample_lost.total_count_change = 0;
        self.settle(&mut data, StatusMask::SAMPLE_LOST, false);
        out
    }

    #[must_use]
    pub fn get_sample_rejected(&self) -> SampleRejectedStatus {
        let mut data = self.data.lock();
        let out = data.sample_rejected.clone();
        data.sample_rejected.total_count_change = 0;
        self.settle(&mut data, StatusMask::SAMPLE_REJECTED, false);
        out
    }

    #[must_use]
    pub fn get_offered_deadline_missed(&self) -> DeadlineMissedStatus {
        let mut data = self.data.lock();
        let out = data.offered_deadline_missed.clone();
        data.offered_deadline_missed.total_count_change = 0;
        self.settle(&mut data, StatusMask::OFFERED_DEADLINE_MISSED, false);
        out
    }

    #[must_use]
    pub fn get_requested_deadline_missed(&self) -> DeadlineMissedStatus {
        let mut data = self.data.lock();
        let out = data.requested_deadline_missed.clone();
        data.requested_deadline_missed.total_count_change = 0;
        self.settle(&mut data, StatusMask::REQUESTED_DEADLINE_MISSED, false);
        out
    }

    #[must_use]
    pub fn get_offered_incompatible_qos(&self) -> IncompatibleQosStatus {
        let mut data = self.data.lock();
        let out = data.offered_incompatible_qos.clone();
        data.offered_incompatible_qos.total_count_change = 0;
        self.settle(&mut data, StatusMask::OFFERED_INCOMPATIBLE_QOS, false);
        out
    }

    #[must_use]
    pub fn get_requested_incompatible_qos(&self) -> IncompatibleQosStatus {
        let mut data = self.data.lock();
        let out = data.requested_incompatible_qos.clone();
        data.requested_incompatible_qos.total_count_change = 0;
        self.settle(&mut data, StatusMask::REQUESTED_INCOMPATIBLE_QOS, false);
        out
    }

    #[must_use]
    pub fn get_inconsistent_topic(&self) -> InconsistentTopicStatus {
        let mut data = self.data.lock();
        let out = data.inconsistent_topic.clone();
        data.inconsistent_topic.total_count_change = 0;
        self.settle(&mut data, StatusMask::INCONSISTENT_TOPIC, false);
        out
    }

    /// Bits with a pending listener dispatch (cleared by `take_*`).
    #[must_use]
    pub fn listener_pending(&self) -> StatusMask {
        self.data.lock().listener_pending
    }
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}
