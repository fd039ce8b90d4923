// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! ReadCondition and QueryCondition: sample-state predicates over a
//! DataReader's history cache.
//!
//! The three mask parts are independent and ORed internally: a sample
//! matches iff every part either is ANY or contains the sample's value.
//! The instance part is a genuine bitset; the sample/view parts are
//! either/both.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::condition::{next_condition_id, Condition, SignalSet};
use super::waitset::WaitSignal;
use crate::core::data::SampleData;
use crate::rhc::{InstanceState, SampleState, ViewState};

// ============================================================================
// State masks
// ============================================================================

/// Sample state mask (READ / NOT_READ).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleStateMask(u32);

impl SampleStateMask {
    pub const READ: SampleStateMask = SampleStateMask(1 << 0);
    pub const NOT_READ: SampleStateMask = SampleStateMask(1 << 1);
    pub const ANY: SampleStateMask = SampleStateMask(Self::READ.0 | Self::NOT_READ.0);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        SampleStateMask(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn matches(&self, state: SampleState) -> bool {
        match state {
            SampleState::Read => self.0 & Self::READ.0 != 0,
            SampleState::NotRead => self.0 & Self::NOT_READ.0 != 0,
        }
    }
}

impl std::ops::BitOr for SampleStateMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        SampleStateMask(self.0 | rhs.0)
    }
}

/// View state mask (NEW / NOT_NEW).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewStateMask(u32);

impl ViewStateMask {
    pub const NEW: ViewStateMask = ViewStateMask(1 << 0);
    pub const NOT_NEW: ViewStateMask = ViewStateMask(1 << 1);
    pub const ANY: ViewStateMask = ViewStateMask(Self::NEW.0 | Self::NOT_NEW.0);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        ViewStateMask(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn matches(&self, state: ViewState) -> bool {
        match state {
            ViewState::New => self.0 & Self::NEW.0 != 0,
            ViewState::NotNew => self.0 & Self::NOT_NEW.0 != 0,
        }
    }
}

impl std::ops::BitOr for ViewStateMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        ViewStateMask(self.0 | rhs.0)
    }
}

/// Instance state mask (ALIVE / NOT_ALIVE_DISPOSED / NOT_ALIVE_NO_WRITERS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceStateMask(u32);

impl InstanceStateMask {
    pub const ALIVE: InstanceStateMask = InstanceStateMask(1 << 0);
    pub const NOT_ALIVE_DISPOSED: InstanceStateMask = InstanceStateMask(1 << 1);
    pub const NOT_ALIVE_NO_WRITERS: InstanceStateMask = InstanceStateMask(1 << 2);
    pub const ANY: InstanceStateMask = InstanceStateMask(
        Self::ALIVE.0 | Self::NOT_ALIVE_DISPOSED.0 | Self::NOT_ALIVE_NO_WRITERS.0,
    );

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        InstanceStateMask(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn matches(&self, state: InstanceState) -> bool {
        match state {
            InstanceState::Alive => self.0 & Self::ALIVE.0 != 0,
            InstanceState::NotAliveDisposed => self.0 & Self::NOT_ALIVE_DISPOSED.0 != 0,
            InstanceState::NotAliveNoWriters => self.0 & Self::NOT_ALIVE_NO_WRITERS.0 != 0,
        }
    }
}

impl std::ops::BitOr for InstanceStateMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        InstanceStateMask(self.0 | rhs.0)
    }
}

/// Combined mask for read/take/peek selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMask {
    pub sample: SampleStateMask,
    pub view: ViewStateMask,
    pub instance: InstanceStateMask,
}

impl ReadMask {
    /// Match everything.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            sample: SampleStateMask::ANY,
            view: ViewStateMask::ANY,
            instance: InstanceStateMask::ANY,
        }
    }

    #[must_use]
    pub const fn new(
        sample: SampleStateMask,
        view: ViewStateMask,
        instance: InstanceStateMask,
    ) -> Self {
        Self {
            sample,
            view,
            instance,
        }
    }

    /// The common "fresh data" selection.
    #[must_use]
    pub const fn not_read() -> Self {
        Self {
            sample: SampleStateMask::NOT_READ,
            view: ViewStateMask::ANY,
            instance: InstanceStateMask::ANY,
        }
    }

    #[must_use]
    pub fn matches(&self, sample: SampleState, view: ViewState, instance: InstanceState) -> bool {
        self.sample.matches(sample) && self.view.matches(view) && self.instance.matches(instance)
    }
}

impl Default for ReadMask {
    fn default() -> Self {
        Self::any()
    }
}

// ============================================================================
// ReadCondition
// ============================================================================

/// Content predicate over serialized samples.
///
/// Invoked on invalid samples too (the handle rebuilds key-only values),
/// so dispose/unregister arrivals dispatch consistently.
pub type QueryFilter = dyn Fn(&SampleData) -> bool + Send + Sync;

/// Condition on the presence of samples matching a state mask (and, for
/// query conditions, a content filter).
pub struct ReadCondition {
    id: u64,
    mask: ReadMask,
    filter: Option<Arc<QueryFilter>>,
    trigger: AtomicBool,
    signals: SignalSet,
}

impl ReadCondition {
    #[must_use]
    pub fn new(mask: ReadMask) -> Self {
        Self {
            id: next_condition_id(),
            mask,
            filter: None,
            trigger: AtomicBool::new(false),
            signals: SignalSet::default(),
        }
    }

    #[must_use]
    pub fn with_filter(mask: ReadMask, filter: Arc<QueryFilter>) -> Self {
        Self {
            id: next_condition_id(),
            mask,
            filter: Some(filter),
            trigger: AtomicBool::new(false),
            signals: SignalSet::default(),
        }
    }

    #[must_use]
    pub fn mask(&self) -> ReadMask {
        self.mask
    }

    #[must_use]
    pub(crate) fn filter(&self) -> Option<&Arc<QueryFilter>> {
        self.filter.as_ref()
    }

    /// Re-evaluate after a cache mutation (called by the reader).
    pub(crate) fn set_trigger(&self, value: bool) {
        let prev = self.trigger.swap(value, Ordering::AcqRel);
        if value && !prev {
            self.signals.notify();
        }
    }
}

impl Condition for ReadCondition {
    fn get_trigger_value(&self) -> bool {
        self.trigger.load(Ordering::Acquire)
    }

    fn condition_id(&self) -> u64 {
        self.id
    }

    fn add_waitset_signal(&self, signal: Arc<dyn WaitSignal>) {
        let trigger_now = self.get_trigger_value();
        self.signals.add(signal, trigger_now);
    }

    fn remove_waitset_signal(&self, signal_id: u64) {
        self.signals.remove(signal_id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// QueryCondition
// ============================================================================

/// ReadCondition specialized with a content predicate.
///
/// Constructed via `DataReader::create_query_condition`, which wraps the
/// typed predicate into a [`QueryFilter`] over serialized samples.
pub struct QueryCondition {
    inner: Arc<ReadCondition>,
}

impl QueryCondition {
    #[must_use]
    pub(crate) fn from_inner(inner: Arc<ReadCondition>) -> Self {
        Self { inner }
    }

    /// The underlying read condition (what the reader evaluates).
    #[must_use]
    pub fn read_condition(&self) -> Arc<ReadCondition> {
        Arc::clone(&self.inner)
    }

    #[must_use]
    pub fn mask(&self) -> ReadMask {
        self.inner.mask()
    }
}

impl Condition for QueryCondition {
    fn get_trigger_value(&self) -> bool {
        self.inner.get_trigger_value()
    }

    fn condition_id(&self) -> u64 {
        self.inner.condition_id()
    }

    fn add_waitset_signal(&self, signal: Arc<dyn WaitSignal>) {
        self.inner.add_waitset_signal(signal);
    }

    fn remove_waitset_signal(&self, signal_id: u64) {
        self.inner.remove_waitset_signal(signal_id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_parts_are_independent() {
        let mask = ReadMask::new(
            SampleStateMask::NOT_READ,
            ViewStateMask::ANY,
            InstanceStateMask::ALIVE | InstanceStateMask::NOT_ALIVE_DISPOSED,
        );

        assert!(mask.matches(SampleState::NotRead, ViewState::New, InstanceState::Alive));
        assert!(mask.matches(
            SampleState::NotRead,
            ViewState::NotNew,
            InstanceState::NotAliveDisposed
        ));
        assert!(!mask.matches(SampleState::Read, ViewState::New, InstanceState::Alive));
        assert!(!mask.matches(
            SampleState::NotRead,
            ViewState::New,
            InstanceState::NotAliveNoWriters
        ));
    }

    #[test]
    fn test_any_mask_matches_everything() {
        let mask = ReadMask::any();
        for s in [SampleState::Read, SampleState::NotRead] {
            for v in [ViewState::New, ViewState::NotNew] {
                for i in [
                    InstanceState::Alive,
                    InstanceState::NotAliveDisposed,
                    InstanceState::NotAliveNoWriters,
                ] {
                    assert!(mask.matches(s, v, i));
                }
            }
        }
    }

    #[test]
    fn test_instance_mask_is_a_bitset() {
        let m = InstanceStateMask::NOT_ALIVE_DISPOSED | InstanceStateMask::NOT_ALIVE_NO_WRITERS;
        assert!(!m.matches(InstanceState::Alive));
        assert!(m.matches(InstanceState::NotAliveDisposed));
        assert!(m.matches(InstanceState::NotAliveNoWriters));
    }

    #[test]
    fn test_read_condition_trigger_edges() {
        let cond = ReadCondition::new(ReadMask::not_read());
        assert!(!cond.get_trigger_value());
        cond.set_trigger(true);
        assert!(cond.get_trigger_value());
        cond.set_trigger(false);
        assert!(!cond.get_trigger_value());
    }
}
