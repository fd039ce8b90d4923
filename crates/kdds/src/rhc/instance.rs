// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Per-instance record: the samples sharing one key and the three state
//! dimensions surfaced to the application.

use std::collections::{HashSet, VecDeque};

use crate::core::data::SampleData;
use crate::core::types::{Guid, InstanceHandle, SequenceNumber, Timestamp};

/// Sample state: has the application read this sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleState {
    Read,
    NotRead,
}

/// View state: is the instance new to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    New,
    NotNew,
}

/// Instance state: alive, disposed, or orphaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Alive,
    NotAliveDisposed,
    NotAliveNoWriters,
}

/// One stored sample.
#[derive(Debug, Clone)]
pub(crate) struct RhcSample {
    pub data: SampleData,
    pub writer: Guid,
    pub seq: SequenceNumber,
    pub source_ts: Timestamp,
    pub read: bool,
    /// `false` for key-only samples that surface dispose/unregister.
    pub valid: bool,
}

/// The set of samples sharing one key within a reader.
#[derive(Debug)]
pub(crate) struct Instance {
    pub handle: InstanceHandle,
    /// Key-only handle kept for `lookup_instance` round trips and invalid
    /// sample construction.
    pub key: SampleData,
    pub samples: VecDeque<RhcSample>,
    /// NEW until the first read after creation or after a
    /// not-alive -> alive cycle.
    pub view_new: bool,
    pub state: InstanceState,
    /// Writers currently registered on this instance.
    pub alive_writers: HashSet<Guid>,
    /// Newest accepted source timestamp (BY_SOURCE ordering gate).
    pub latest_source_ts: Option<Timestamp>,
}

impl Instance {
    pub fn new(handle: InstanceHandle, key: SampleData) -> Self {
        Self {
            handle,
            key,
            samples: VecDeque::new(),
            view_new: true,
            state: InstanceState::Alive,
            alive_writers: HashSet::new(),
            latest_source_ts: None,
        }
    }

    /// A writer produced data for this instance. Returns `true` on a
    /// not-alive -> alive transition (which also renews the view state).
    pub fn on_alive(&mut self, writer: Guid) -> bool {
        self.alive_writers.insert(writer);
        if self.state != InstanceState::Alive {
            self.state = InstanceState::Alive;
            self.view_new = true;
            return true;
        }
        false
    }

    /// Dispose by some writer. Returns `true` on an alive -> not-alive
    /// transition.
    pub fn on_dispose(&mut self) -> bool {
        if self.state == InstanceState::Alive {
            self.state = InstanceState::NotAliveDisposed;
            return true;
        }
        // Disposed dominates no-writers.
        if self.state == InstanceState::NotAliveNoWriters {
            self.state = InstanceState::NotAliveDisposed;
        }
        false
    }

    /// Unregister by one writer. Returns `true` when the last registered
    /// writer left and the instance turned NOT_ALIVE_NO_WRITERS.
    pub fn on_unregister(&mut self, writer: &Guid) -> bool {
        self.alive_writers.remove(writer);
        if self.alive_writers.is_empty() && self.state == InstanceState::Alive {
            self.state = InstanceState::NotAliveNoWriters;
            return true;
        }
        false
    }

    /// A matched writer disappeared (deletion or lost liveliness).
    pub fn on_writer_lost(&mut self, writer: &Guid) -> bool {
        self.on_unregister(writer)
    }

    /// Current number of valid samples (invalid samples do not count
    /// toward resource limits).
    pub fn valid_count(&self) -> usize {
        self.samples.iter().filter(|s| s.valid).count()
    }

    /// Whether a dispose/unregister needs an invalid sample to become
    /// observable: nothing stored, or everything stored already read.
    pub fn needs_invalid_sample(&self) -> bool {
        self.samples.iter().all(|s| s.read)
    }

    /// Whether the instance can be dropped: not alive and fully taken.
    pub fn is_empty_and_dead(&self) -> bool {
        self.samples.is_empty() && self.state != InstanceState::Alive
    }

    pub fn view_state(&self) -> ViewState {
        if self.view_new {
            ViewState::New
        } else {
            ViewState::NotNew
        }
    }
}
