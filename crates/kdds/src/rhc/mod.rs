// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Reader History Cache (RHC)
//!
//! Per-reader storage of received samples, keyed by instance. Tracks the
//! three orthogonal state dimensions (sample/view/instance), enforces
//! resource limits with precise rejection reasons, evaluates read
//! conditions, and drives the `data_available` status.
//!
//! Ordering: within an instance samples are kept in reception order;
//! instances are visited in creation order (instance handles are allocated
//! monotonically).

mod instance;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::data::SampleData;
use crate::core::types::{Guid, InstanceHandle, KeyHash, SequenceNumber, Timestamp};
use crate::dds::qos::LENGTH_UNLIMITED;
use crate::dds::{
    Error, History, QosProfile, QueryFilter, ReadCondition, ReadMask, Result,
    SampleRejectedReason, StatusRegistry,
};

pub use instance::{InstanceState, SampleState, ViewState};
use instance::{Instance, RhcSample};

/// Configuration derived from the reader's QoS.
#[derive(Debug, Clone)]
pub struct RhcConfig {
    pub history: History,
    pub max_samples: usize,
    pub max_instances: usize,
    pub max_samples_per_instance: usize,
    /// BY_SOURCE_TIMESTAMP destination order.
    pub by_source_order: bool,
}

impl RhcConfig {
    #[must_use]
    pub fn from_qos(qos: &QosProfile) -> Self {
        Self {
            history: qos.history,
            max_samples: qos.resource_limits.max_samples,
            max_instances: qos.resource_limits.max_instances,
            max_samples_per_instance: qos.resource_limits.max_samples_per_instance,
            by_source_order: matches!(
                qos.destination_order,
                crate::dds::qos::DestinationOrder::BySourceTimestamp
            ),
        }
    }
}

impl Default for RhcConfig {
    fn default() -> Self {
        Self::from_qos(&QosProfile::default().history_keep_all())
    }
}

/// Per-sample metadata returned with read/take/peek.
#[derive(Debug, Clone)]
pub struct SampleInfo {
    pub valid_data: bool,
    pub sample_state: SampleState,
    pub view_state: ViewState,
    pub instance_state: InstanceState,
    pub instance_handle: InstanceHandle,
    pub publication_handle: Guid,
    pub source_timestamp: Timestamp,
    pub sequence_number: SequenceNumber,
    /// Count of later samples of the same instance still in the cache
    /// that satisfy the same mask, evaluated at call time.
    pub sample_rank: u32,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ReadOp {
    Read,
    Take,
    Peek,
}

struct RhcInner {
    by_key: HashMap<KeyHash, InstanceHandle>,
    by_handle: std::collections::BTreeMap<InstanceHandle, Instance>,
    next_handle: u64,
    total_valid: usize,
}

impl RhcInner {
    fn alloc_handle(&mut self) -> InstanceHandle {
        let handle = InstanceHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }
}

/// Reader History Cache.
pub struct ReaderHistoryCache {
    cfg: RhcConfig,
    status: Arc<StatusRegistry>,
    inner: Mutex<RhcInner>,
    conditions: Mutex<Vec<Arc<ReadCondition>>>,
}

impl ReaderHistoryCache {
    #[must_use]
    pub fn new(cfg: RhcConfig, status: Arc<StatusRegistry>) -> Self {
        Self {
            cfg,
            status,
            inner: Mutex::new(RhcInner {
                by_key: HashMap::new(),
                by_handle: std::collections::BTreeMap::new(),
                next_handle: 1,
                total_valid: 0,
            }),
            conditions: Mutex::new(Vec::new()),
        }
    }

    // ========================================================================
    // Store path (driven by the delivery machinery)
    // ========================================================================

    /// Store a received sample. Returns `true` when accepted.
    ///
    /// Rejections surface through `sample_rejected` with the precise
    /// reason; BY_SOURCE timestamp regressions surface as `sample_lost`.
    pub fn store(&self, writer: Guid, seq: SequenceNumber, data: SampleData) -> bool {
        let accepted = self.store_inner(writer, seq, data);
        self.refresh_conditions();
        accepted
    }

    fn store_inner(&self, writer: Guid, seq: SequenceNumber, data: SampleData) -> bool {
        let mut inner = self.inner.lock();
        let key = data.key_hash();
        let is_dispose = data.is_dispose();
        let is_unregister = data.is_unregister();
        let valid = matches!(data.kind(), crate::core::data::SampleDataKind::Data);

        // Resolve or create the instance.
        let handle = match inner.by_key.get(&key).copied() {
            Some(h) => h,
            None => {
                if self.cfg.max_instances != LENGTH_UNLIMITED
                    && inner.by_handle.len() >= self.cfg.max_instances
                {
                    drop(inner);
                    log::debug!("[ReaderHistoryCache::store] instance limit reached");
                    self.status
                        .push_sample_rejected(SampleRejectedReason::RejectedByInstancesLimit, None);
                    return false;
                }
                let handle = inner.alloc_handle();
                let key_sample = SampleData::from_wire(
                    crate::core::data::SampleDataKind::Key,
                    Vec::new(),
                    data.key_bytes().to_vec(),
                    key,
                    data.timestamp(),
                    0,
                );
                inner.by_key.insert(key, handle);
                inner
                    .by_handle
                    .insert(handle, Instance::new(handle, key_sample));
                handle
            }
        };

        // BY_SOURCE: a sample older than the newest accepted one is lost.
        if self.cfg.by_source_order {
            let stale = inner
                .by_handle
                .get(&handle)
                .and_then(|i| i.latest_source_ts)
                .is_some_and(|latest| data.timestamp() < latest);
            if stale {
                drop(inner);
                self.status.push_sample_lost();
                return false;
            }
        }

        // Resource limits apply to valid data only.
        if valid {
            match self.cfg.history {
                History::KeepAll => {
                    let inst_valid = inner
                        .by_handle
                        .get(&handle)
                        .map_or(0, Instance::valid_count);
                    if self.cfg.max_samples != LENGTH_UNLIMITED
                        && inner.total_valid >= self.cfg.max_samples
                    {
                        drop(inner);
                        self.status.push_sample_rejected(
                            SampleRejectedReason::RejectedBySamplesLimit,
                            Some(handle),
                        );
                        return false;
                    }
                    if self.cfg.max_samples_per_instance != LENGTH_UNLIMITED
                        && inst_valid >= self.cfg.max_samples_per_instance
                    {
                        drop(inner);
                        self.status.push_sample_rejected(
                            SampleRejectedReason::RejectedBySamplesPerInstanceLimit,
                            Some(handle),
                        );
                        return false;
                    }
                }
                History::KeepLast(depth) => {
                    // Sliding window: push out the oldest valid samples.
                    let mut removed = 0usize;
                    if let Some(inst) = inner.by_handle.get_mut(&handle) {
                        while inst.valid_count() >= depth as usize {
                            match inst.samples.iter().position(|s| s.valid) {
                                Some(pos) => {
                                    inst.samples.remove(pos);
                                    removed += 1;
                                }
                                None => break,
                            }
                        }
                    }
                    inner.total_valid = inner.total_valid.saturating_sub(removed);
                }
            }
        }

        let mut observable_change = false;
        let mut added_valid = false;

        if let Some(inst) = inner.by_handle.get_mut(&handle) {
            inst.latest_source_ts = Some(
                inst.latest_source_ts
                    .map_or(data.timestamp(), |t| t.max(data.timestamp())),
            );

            if valid {
                inst.on_alive(writer);
                inst.samples.push_back(RhcSample {
                    data: data.clone(),
                    writer,
                    seq,
                    source_ts: data.timestamp(),
                    read: false,
                    valid: true,
                });
                added_valid = true;
                observable_change = true;
            }

            if is_dispose || is_unregister {
                let mut transitioned = false;
                if is_unregister {
                    transitioned |= inst.on_unregister(&writer);
                }
                if is_dispose {
                    transitioned |= inst.on_dispose();
                }
                // Surface the state change: piggyback on an unread sample
                // if one exists, otherwise append an invalid sample.
                if !valid && inst.needs_invalid_sample() {
                    inst.samples.push_back(RhcSample {
                        data: data.clone(),
                        writer,
                        seq,
                        source_ts: data.timestamp(),
                        read: false,
                        valid: false,
                    });
                    observable_change = true;
                } else if transitioned {
                    observable_change = true;
                }
            }
        }

        if added_valid {
            inner.total_valid += 1;
        }
        drop(inner);
        if observable_change {
            self.status.push_data_available();
        }
        true
    }

    /// A matched writer went away: its instances lose a registered writer
    /// and may turn NOT_ALIVE_NO_WRITERS.
    pub fn writer_lost(&self, writer: Guid) {
        let mut changed = false;
        {
            let mut inner = self.inner.lock();
            for inst in inner.by_handle.values_mut() {
                if inst.on_writer_lost(&writer) {
                    if inst.needs_invalid_sample() {
                        let key = inst.key.clone();
                        inst.samples.push_back(RhcSample {
                            data: key,
                            writer,
                            seq: 0,
                            source_ts: Timestamp::now(),
                            read: false,
                            valid: false,
                        });
                    }
                    changed = true;
                }
            }
        }
        if changed {
            self.status.push_data_available();
            self.refresh_conditions();
        }
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Non-destructive read; returned samples transition to READ.
    pub fn read(
        &self,
        max_samples: usize,
        mask: ReadMask,
        filter: Option<&QueryFilter>,
    ) -> Vec<(SampleInfo, SampleData)> {
        self.select(ReadOp::Read, None, max_samples, mask, filter)
            .unwrap_or_default()
    }

    /// Destructive counterpart of `read`.
    pub fn take(
        &self,
        max_samples: usize,
        mask: ReadMask,
        filter: Option<&QueryFilter>,
    ) -> Vec<(SampleInfo, SampleData)> {
        self.select(ReadOp::Take, None, max_samples, mask, filter)
            .unwrap_or_default()
    }

    /// Like `read` but mutates neither sample-state nor view-state.
    pub fn peek(
        &self,
        max_samples: usize,
        mask: ReadMask,
        filter: Option<&QueryFilter>,
    ) -> Vec<(SampleInfo, SampleData)> {
        self.select(ReadOp::Peek, None, max_samples, mask, filter)
            .unwrap_or_default()
    }

    /// Read restricted to one instance.
    ///
    /// # Errors
    ///
    /// `Error::PreconditionNotMet` for an unknown instance handle.
    pub fn read_instance(
        &self,
        handle: InstanceHandle,
        max_samples: usize,
        mask: ReadMask,
    ) -> Result<Vec<(SampleInfo, SampleData)>> {
        self.select(ReadOp::Read, Some(handle), max_samples, mask, None)
    }

    /// Take restricted to one instance.
    ///
    /// # Errors
    ///
    /// `Error::PreconditionNotMet` for an unknown instance handle.
    pub fn take_instance(
        &self,
        handle: InstanceHandle,
        max_samples: usize,
        mask: ReadMask,
    ) -> Result<Vec<(SampleInfo, SampleData)>> {
        self.select(ReadOp::Take, Some(handle), max_samples, mask, None)
    }

    /// Stream matching samples to a collector.
    ///
    /// A negative collector return aborts: if no sample was collected yet
    /// the code propagates unchanged, otherwise the count of successfully
    /// collected samples is returned. Collected samples transition to READ.
    pub fn read_with_collector(
        &self,
        max_samples: usize,
        mask: ReadMask,
        filter: Option<&QueryFilter>,
        collector: &mut dyn FnMut(&SampleInfo, &SampleData) -> i32,
    ) -> i32 {
        let mut inner = self.inner.lock();
        let picks = Self::pick(&inner, None, max_samples, mask, filter);

        let mut collected: i32 = 0;
        let mut touched: Vec<(InstanceHandle, usize)> = Vec::new();
        for (handle, idx, info) in &picks {
            let Some(inst) = inner.by_handle.get(handle) else {
                continue;
            };
            let data = inst.samples[*idx].data.clone();
            let rc = collector(info, &data);
            if rc < 0 {
                if collected == 0 {
                    return rc;
                }
                break;
            }
            collected += 1;
            touched.push((*handle, *idx));
        }

        for (handle, idx) in &touched {
            if let Some(inst) = inner.by_handle.get_mut(handle) {
                inst.samples[*idx].read = true;
                inst.view_new = false;
            }
        }
        drop(inner);

        if collected > 0 {
            self.status.clear_data_available();
            self.refresh_conditions();
        }
        collected
    }

    fn select(
        &self,
        op: ReadOp,
        scope: Option<InstanceHandle>,
        max_samples: usize,
        mask: ReadMask,
        filter: Option<&QueryFilter>,
    ) -> Result<Vec<(SampleInfo, SampleData)>> {
        let mut inner = self.inner.lock();
        if let Some(handle) = scope {
            if !inner.by_handle.contains_key(&handle) {
                return Err(Error::PreconditionNotMet(format!(
                    "unknown instance handle {}",
                    handle
                )));
            }
        }

        let picks = Self::pick(&inner, scope, max_samples, mask, filter);
        let mut out = Vec::with_capacity(picks.len());

        for (handle, idx, info) in &picks {
            let Some(inst) = inner.by_handle.get(handle) else {
                continue;
            };
            out.push((info.clone(), inst.samples[*idx].data.clone()));
        }

        match op {
            ReadOp::Peek => {}
            ReadOp::Read => {
                for (handle, idx, _) in &picks {
                    if let Some(inst) = inner.by_handle.get_mut(handle) {
                        inst.samples[*idx].read = true;
                        inst.view_new = false;
                    }
                }
            }
            ReadOp::Take => {
                // Remove per instance in descending index order so the
                // earlier indices stay valid.
                let mut by_instance: HashMap<InstanceHandle, Vec<usize>> = HashMap::new();
                for (handle, idx, _) in &picks {
                    by_instance.entry(*handle).or_default().push(*idx);
                }
                for (handle, mut idxs) in by_instance {
                    idxs.sort_unstable_by(|a, b| b.cmp(a));
                    let mut removed_valid = 0usize;
                    let mut dead = false;
                    if let Some(inst) = inner.by_handle.get_mut(&handle) {
                        for idx in idxs {
                            if let Some(s) = inst.samples.remove(idx) {
                                if s.valid {
                                    removed_valid += 1;
                                }
                            }
                        }
                        inst.view_new = false;
                        dead = inst.is_empty_and_dead();
                    }
                    inner.total_valid = inner.total_valid.saturating_sub(removed_valid);
                    if dead {
                        if let Some(inst) = inner.by_handle.remove(&handle) {
                            inner.by_key.remove(&inst.key.key_hash());
                        }
                    }
                }
            }
        }
        drop(inner);

        if !matches!(op, ReadOp::Peek) && !out.is_empty() {
            self.status.clear_data_available();
            self.refresh_conditions();
        }
        Ok(out)
    }

    /// Selection phase: (instance, sample index, info) for every matching
    /// sample up to `max_samples`, instances in creation order, samples in
    /// reception order. Ranks count matching successors in the full cache,
    /// not just the capped selection.
    fn pick(
        inner: &RhcInner,
        scope: Option<InstanceHandle>,
        max_samples: usize,
        mask: ReadMask,
        filter: Option<&QueryFilter>,
    ) -> Vec<(InstanceHandle, usize, SampleInfo)> {
        let mut picks = Vec::new();

        for (handle, inst) in &inner.by_handle {
            if scope.is_some_and(|s| s != *handle) {
                continue;
            }
            if picks.len() >= max_samples {
                break;
            }

            let vst = inst.view_state();
            let ist = inst.state;
            let matched: Vec<usize> = inst
                .samples
                .iter()
                .enumerate()
                .filter(|(_, s)| {
                    let sst = if s.read {
                        SampleState::Read
                    } else {
                        SampleState::NotRead
                    };
                    mask.matches(sst, vst, ist) && filter.is_none_or(|f| f(&s.data))
                })
                .map(|(i, _)| i)
                .collect();

            for (pos, idx) in matched.iter().enumerate() {
                if picks.len() >= max_samples {
                    break;
                }
                let sample = &inst.samples[*idx];
                let rank = (matched.len() - 1 - pos) as u32;
                picks.push((
                    *handle,
                    *idx,
                    SampleInfo {
                        valid_data: sample.valid,
                        sample_state: if sample.read {
                            SampleState::Read
                        } else {
                            SampleState::NotRead
                        },
                        view_state: vst,
                        instance_state: ist,
                        instance_handle: *handle,
                        publication_handle: sample.writer,
                        source_timestamp: sample.source_ts,
                        sequence_number: sample.seq,
                        sample_rank: rank,
                    },
                ));
            }
        }
        picks
    }

    // ========================================================================
    // Instance surface
    // ========================================================================

    /// Deterministic key -> handle mapping, stable until the instance is
    /// destroyed.
    #[must_use]
    pub fn lookup_instance(&self, key: &KeyHash) -> Option<InstanceHandle> {
        self.inner.lock().by_key.get(key).copied()
    }

    /// Pre-allocate the instance handle for a key.
    ///
    /// Idempotent with `lookup_instance`: registering an alive instance
    /// returns its existing handle.
    ///
    /// # Errors
    ///
    /// `Error::OutOfResources` when the instance limit blocks creation.
    pub fn register_instance(&self, key: SampleData) -> Result<InstanceHandle> {
        let mut inner = self.inner.lock();
        let hash = key.key_hash();
        if let Some(handle) = inner.by_key.get(&hash) {
            return Ok(*handle);
        }
        if self.cfg.max_instances != LENGTH_UNLIMITED
            && inner.by_handle.len() >= self.cfg.max_instances
        {
            return Err(Error::OutOfResources("instance limit reached".into()));
        }
        let handle = inner.alloc_handle();
        inner.by_key.insert(hash, handle);
        inner.by_handle.insert(handle, Instance::new(handle, key));
        Ok(handle)
    }

    /// Key handle of an instance (for rebuilding key-only values).
    #[must_use]
    pub fn instance_key(&self, handle: InstanceHandle) -> Option<SampleData> {
        self.inner
            .lock()
            .by_handle
            .get(&handle)
            .map(|i| i.key.clone())
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.inner.lock().by_handle.len()
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.inner
            .lock()
            .by_handle
            .values()
            .map(|i| i.samples.len())
            .sum()
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    pub fn attach_condition(&self, condition: Arc<ReadCondition>) {
        condition.set_trigger(self.any_match(condition.mask(), condition.filter().map(Arc::as_ref)));
        self.conditions.lock().push(condition);
    }

    pub fn detach_condition(&self, condition_id: u64) {
        use crate::dds::Condition;
        self.conditions
            .lock()
            .retain(|c| c.condition_id() != condition_id);
    }

    fn any_match(&self, mask: ReadMask, filter: Option<&QueryFilter>) -> bool {
        let inner = self.inner.lock();
        !Self::pick(&inner, None, 1, mask, filter).is_empty()
    }

    fn refresh_conditions(&self) {
        let conditions: Vec<Arc<ReadCondition>> = self.conditions.lock().clone();
        for cond in conditions {
            let triggered = self.any_match(cond.mask(), cond.filter().map(Arc::as_ref));
            cond.set_trigger(triggered);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data::{SampleDataKind, STATUSINFO_DISPOSE, STATUSINFO_UNREGISTER};
    use crate::dds::{InstanceStateMask, ResourceLimits, SampleStateMask, ViewStateMask};

    fn writer(tag: u8) -> Guid {
        Guid::from_bytes([tag; 16])
    }

    fn data(key: u8, value: u8, ts: u64) -> SampleData {
        SampleData::from_wire(
            SampleDataKind::Data,
            vec![value],
            vec![key],
            KeyHash::from_key_bytes(&[key]),
            Timestamp::from_nanos(ts),
            0,
        )
    }

    fn dispose(key: u8, ts: u64) -> SampleData {
        SampleData::from_wire(
            SampleDataKind::Key,
            Vec::new(),
            vec![key],
            KeyHash::from_key_bytes(&[key]),
            Timestamp::from_nanos(ts),
            STATUSINFO_DISPOSE,
        )
    }

    fn unregister(key: u8, ts: u64) -> SampleData {
        SampleData::from_wire(
            SampleDataKind::Key,
            Vec::new(),
            vec![key],
            KeyHash::from_key_bytes(&[key]),
            Timestamp::from_nanos(ts),
            STATUSINFO_UNREGISTER,
        )
    }

    fn rhc() -> ReaderHistoryCache {
        ReaderHistoryCache::new(RhcConfig::default(), Arc::new(StatusRegistry::new()))
    }

    fn rhc_with(cfg: RhcConfig) -> (ReaderHistoryCache, Arc<StatusRegistry>) {
        let status = Arc::new(StatusRegistry::new());
        (ReaderHistoryCache::new(cfg, Arc::clone(&status)), status)
    }

    #[test]
    fn test_store_and_read_states() {
        let cache = rhc();
        assert!(cache.store(writer(1), 1, data(0, 10, 100)));
        assert!(cache.store(writer(1), 2, data(1, 20, 101)));

        let out = cache.read(64, ReadMask::any(), None);
        assert_eq!(out.len(), 2);
        for (info, _) in &out {
            assert!(info.valid_data);
            assert_eq!(info.sample_state, SampleState::NotRead);
            assert_eq!(info.view_state, ViewState::New);
            assert_eq!(info.instance_state, InstanceState::Alive);
        }

        // Second read: everything READ / NOT_NEW now.
        let out = cache.read(64, ReadMask::any(), None);
        assert_eq!(out.len(), 2);
        for (info, _) in &out {
            assert_eq!(info.sample_state, SampleState::Read);
            assert_eq!(info.view_state, ViewState::NotNew);
        }
    }

    #[test]
    fn test_read_is_idempotent_on_unchanged_cache() {
        let cache = rhc();
        cache.store(writer(1), 1, data(0, 1, 1));
        cache.store(writer(1), 2, data(0, 2, 2));
        let _ = cache.read(64, ReadMask::any(), None);

        let a = cache.read(64, ReadMask::any(), None);
        let b = cache.read(64, ReadMask::any(), None);
        assert_eq!(a.len(), b.len());
        for ((ia, da), (ib, db)) in a.iter().zip(b.iter()) {
            assert_eq!(ia.sequence_number, ib.sequence_number);
            assert_eq!(da.payload(), db.payload());
        }
    }

    #[test]
    fn test_take_removes_samples() {
        let cache = rhc();
        cache.store(writer(1), 1, data(0, 1, 1));
        cache.store(writer(1), 2, data(0, 2, 2));

        let out = cache.take(64, ReadMask::any(), None);
        assert_eq!(out.len(), 2);
        assert!(cache.take(64, ReadMask::any(), None).is_empty());
        assert_eq!(cache.sample_count(), 0);
    }

    #[test]
    fn test_peek_mutates_nothing() {
        let cache = rhc();
        cache.store(writer(1), 1, data(0, 1, 1));

        let out = cache.peek(64, ReadMask::any(), None);
        assert_eq!(out[0].0.sample_state, SampleState::NotRead);
        assert_eq!(out[0].0.view_state, ViewState::New);

        let out = cache.peek(64, ReadMask::any(), None);
        assert_eq!(out[0].0.sample_state, SampleState::NotRead);
        assert_eq!(out[0].0.view_state, ViewState::New);
    }

    #[test]
    fn test_mask_selects_not_read_only() {
        let cache = rhc();
        cache.store(writer(1), 1, data(0, 1, 1));
        let _ = cache.read(64, ReadMask::any(), None);
        cache.store(writer(1), 2, data(0, 2, 2));

        let out = cache.read(64, ReadMask::not_read(), None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0.sequence_number, 2);
    }

    #[test]
    fn test_dispose_existing_instance_piggybacks() {
        let cache = rhc();
        cache.store(writer(1), 1, data(0, 0, 1));
        cache.store(writer(1), 2, data(1, 2, 2));
        cache.store(writer(1), 3, dispose(0, 3));

        // No invalid sample needed: the unread valid sample carries it.
        let out = cache.read(64, ReadMask::any(), None);
        assert_eq!(out.len(), 2);
        let k0 = out
            .iter()
            .find(|(_, d)| d.key_bytes() == [0])
            .expect("k=0 sample");
        assert!(k0.0.valid_data);
        assert_eq!(k0.0.instance_state, InstanceState::NotAliveDisposed);
        let k1 = out
            .iter()
            .find(|(_, d)| d.key_bytes() == [1])
            .expect("k=1 sample");
        assert_eq!(k1.0.instance_state, InstanceState::Alive);
    }

    #[test]
    fn test_dispose_new_instance_adds_invalid_sample() {
        let cache = rhc();
        cache.store(writer(1), 1, dispose(5, 1));

        let out = cache.read(64, ReadMask::any(), None);
        assert_eq!(out.len(), 1);
        assert!(!out[0].0.valid_data);
        assert_eq!(out[0].0.instance_state, InstanceState::NotAliveDisposed);
        assert_eq!(out[0].0.sample_state, SampleState::NotRead);
        assert_eq!(out[0].0.view_state, ViewState::New);
    }

    #[test]
    fn test_unregister_last_writer_no_writers() {
        let cache = rhc();
        cache.store(writer(1), 1, data(3, 1, 1));
        let _ = cache.read(64, ReadMask::any(), None);
        cache.store(writer(1), 2, unregister(3, 2));

        let out = cache.read(64, ReadMask::any(), None);
        // The read sample plus the invalid unregister sample.
        assert_eq!(out.len(), 2);
        let invalid = out.iter().find(|(i, _)| !i.valid_data).expect("invalid");
        assert_eq!(invalid.0.instance_state, InstanceState::NotAliveNoWriters);
    }

    #[test]
    fn test_by_source_order_drops_old_timestamp() {
        let cfg = RhcConfig {
            by_source_order: true,
            ..RhcConfig::default()
        };
        let (cache, status) = rhc_with(cfg);
        cache.store(writer(1), 1, data(0, 1, 1_000));
        // Older source timestamp: dropped, surfaces as sample_lost.
        assert!(!cache.store(writer(1), 2, data(0, 2, 500)));
        assert_eq!(status.get_sample_lost().total_count, 1);

        // Instance untouched: still alive, one sample.
        let out = cache.read(64, ReadMask::any(), None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0.instance_state, InstanceState::Alive);
    }

    #[test]
    fn test_by_source_dispose_in_past_dropped() {
        let cfg = RhcConfig {
            by_source_order: true,
            ..RhcConfig::default()
        };
        let (cache, status) = rhc_with(cfg);
        cache.store(writer(1), 1, data(0, 1, 1_000));
        assert!(!cache.store(writer(1), 2, dispose(0, 500)));
        assert_eq!(status.get_sample_lost().total_count, 1);

        let out = cache.read(64, ReadMask::any(), None);
        assert_eq!(out[0].0.instance_state, InstanceState::Alive);
    }

    #[test]
    fn test_resource_limit_111_reasons() {
        let qos = QosProfile::reliable().resource_limits(ResourceLimits::bounded(1, 1, 1));
        let (cache, status) = rhc_with(RhcConfig::from_qos(&qos));

        assert!(cache.store(writer(1), 1, data(0, 1, 1)));
        // Second sample, same key: samples limit.
        assert!(!cache.store(writer(1), 2, data(0, 2, 2)));
        let s = status.get_sample_rejected();
        assert_eq!(s.last_reason, SampleRejectedReason::RejectedBySamplesLimit);

        // Second instance: instances limit.
        assert!(!cache.store(writer(1), 3, data(1, 3, 3)));
        let s = status.get_sample_rejected();
        assert_eq!(s.last_reason, SampleRejectedReason::RejectedByInstancesLimit);
        assert_eq!(s.total_count, 2);
    }

    #[test]
    fn test_rejected_count_five_same_key() {
        let qos = QosProfile::reliable().resource_limits(ResourceLimits::bounded(1, 1, 1));
        let (cache, status) = rhc_with(RhcConfig::from_qos(&qos));

        for seq in 1..=5 {
            cache.store(writer(1), seq, data(7, seq as u8, seq as u64));
        }
        let s = status.get_sample_rejected();
        assert_eq!(s.total_count, 4);
        assert_eq!(s.last_reason, SampleRejectedReason::RejectedBySamplesLimit);
    }

    #[test]
    fn test_keep_last_pushes_out_oldest() {
        let qos = QosProfile::default().history_keep_last(2);
        let (cache, status) = rhc_with(RhcConfig::from_qos(&qos));

        for seq in 1..=4 {
            assert!(cache.store(writer(1), seq, data(0, seq as u8, seq as u64)));
        }
        // No rejections under KEEP_LAST; oldest samples pushed out.
        assert_eq!(status.get_sample_rejected().total_count, 0);
        let out = cache.read(64, ReadMask::any(), None);
        let seqs: Vec<_> = out.iter().map(|(i, _)| i.sequence_number).collect();
        assert_eq!(seqs, vec![3, 4]);
    }

    #[test]
    fn test_sample_rank_counts_later_matching() {
        let cache = rhc();
        for seq in 1..=3 {
            cache.store(writer(1), seq, data(0, seq as u8, seq as u64));
        }
        cache.store(writer(1), 4, data(1, 9, 4));

        let out = cache.read(64, ReadMask::any(), None);
        assert_eq!(out.len(), 4);
        let ranks: Vec<_> = out.iter().map(|(i, _)| i.sample_rank).collect();
        // Instance k=0 has 3 samples (ranks 2,1,0), k=1 has one (rank 0).
        assert_eq!(ranks, vec![2, 1, 0, 0]);
    }

    #[test]
    fn test_sample_rank_under_mask() {
        let cache = rhc();
        cache.store(writer(1), 1, data(0, 1, 1));
        let _ = cache.read(64, ReadMask::any(), None); // seq 1 becomes READ
        cache.store(writer(1), 2, data(0, 2, 2));
        cache.store(writer(1), 3, data(0, 3, 3));

        // Under NOT_READ only two samples match; ranks ignore the READ one.
        let out = cache.peek(64, ReadMask::not_read(), None);
        let ranks: Vec<_> = out.iter().map(|(i, _)| i.sample_rank).collect();
        assert_eq!(ranks, vec![1, 0]);
    }

    #[test]
    fn test_read_instance_scoping() {
        let cache = rhc();
        cache.store(writer(1), 1, data(0, 1, 1));
        cache.store(writer(1), 2, data(1, 2, 2));

        let h0 = cache
            .lookup_instance(&KeyHash::from_key_bytes(&[0]))
            .expect("instance exists");
        let out = cache
            .read_instance(h0, 64, ReadMask::any())
            .expect("read_instance");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0.instance_handle, h0);

        let err = cache
            .read_instance(InstanceHandle(999), 64, ReadMask::any())
            .expect_err("unknown handle");
        assert!(matches!(err, Error::PreconditionNotMet(_)));
    }

    #[test]
    fn test_lookup_register_equivalence() {
        let cache = rhc();
        cache.store(writer(1), 1, data(4, 1, 1));

        let h = cache
            .lookup_instance(&KeyHash::from_key_bytes(&[4]))
            .expect("instance");
        let h2 = cache
            .register_instance(dispose(4, 0).with_statusinfo(0))
            .expect("register");
        assert_eq!(h, h2);
    }

    #[test]
    fn test_take_destroys_dead_instance() {
        let cache = rhc();
        cache.store(writer(1), 1, data(0, 1, 1));
        cache.store(writer(1), 2, dispose(0, 2));

        assert_eq!(cache.instance_count(), 1);
        let out = cache.take(64, ReadMask::any(), None);
        assert_eq!(out.len(), 1);
        // Not alive and fully taken: instance destroyed.
        assert_eq!(cache.instance_count(), 0);
        assert!(cache
            .lookup_instance(&KeyHash::from_key_bytes(&[0]))
            .is_none());
    }

    #[test]
    fn test_writer_lost_transitions_instances() {
        let cache = rhc();
        cache.store(writer(1), 1, data(0, 1, 1));
        cache.store(writer(2), 1, data(1, 2, 2));
        let _ = cache.read(64, ReadMask::any(), None);

        cache.writer_lost(writer(1));
        let mask = ReadMask::new(
            SampleStateMask::ANY,
            ViewStateMask::ANY,
            InstanceStateMask::NOT_ALIVE_NO_WRITERS,
        );
        let out = cache.read(64, mask, None);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0.instance_state, InstanceState::NotAliveNoWriters);
    }

    #[test]
    fn test_collector_partial_progress() {
        let cache = rhc();
        for seq in 1..=3 {
            cache.store(writer(1), seq, data(0, seq as u8, seq as u64));
        }

        // Abort after two samples: count reflects partial progress.
        let mut calls = 0;
        let rc = cache.read_with_collector(64, ReadMask::any(), None, &mut |_, _| {
            calls += 1;
            if calls == 3 {
                -42
            } else {
                0
            }
        });
        assert_eq!(rc, 2);

        // Only the collected samples were marked read.
        let unread = cache.read(64, ReadMask::not_read(), None);
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].0.sequence_number, 3);
    }

    #[test]
    fn test_collector_error_on_first_sample() {
        let cache = rhc();
        cache.store(writer(1), 1, data(0, 1, 1));

        let rc = cache.read_with_collector(64, ReadMask::any(), None, &mut |_, _| -7);
        assert_eq!(rc, -7);
        // Nothing marked read.
        assert_eq!(cache.read(64, ReadMask::not_read(), None).len(), 1);
    }

    #[test]
    fn test_query_filter_sees_invalid_samples() {
        let cache = rhc();
        cache.store(writer(1), 1, dispose(6, 1));

        // Filter on key bytes works for key-only samples.
        let filter: Arc<QueryFilter> = Arc::new(|d: &SampleData| d.key_bytes() == [6]);
        let out = cache.read(64, ReadMask::any(), Some(filter.as_ref()));
        assert_eq!(out.len(), 1);
        assert!(!out[0].0.valid_data);
    }

    #[test]
    fn test_condition_triggers_on_store_and_clears_on_take(){
        use crate::dds::Condition;
        let cache = rhc();
        let cond = Arc::new(ReadCondition::new(ReadMask::not_read()));
        cache.attach_condition(Arc::clone(&cond));
        assert!(!cond.get_trigger_value());

        cache.store(writer(1), 1, data(0, 1, 1));
        assert!(cond.get_trigger_value());

        let _ = cache.take(64, ReadMask::any(), None);
        assert!(!cond.get_trigger_value());
    }
}
