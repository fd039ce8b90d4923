// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! WaitSet - blocking wait for Condition triggers.
//!
//! Conditions register a signal when attached so they can wake blocked
//! waiters the moment their trigger value flips to `true`. The driver is a
//! condvar with a coalesced wake counter; signals are cheap and may fire
//! from any thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::condition::Condition;
use super::{Error, Result};

/// Wake hook handed to conditions; `signal` may be called from any thread.
pub trait WaitSignal: Send + Sync {
    fn signal(&self);
    /// Unique id, used to unregister on detach.
    fn id(&self) -> u64;
}

struct Driver {
    /// Coalesced wake counter; waiters sleep until it advances.
    wakes: Mutex<u64>,
    cond: Condvar,
}

impl Driver {
    fn notify(&self) {
        *self.wakes.lock() += 1;
        self.cond.notify_all();
    }
}

struct DriverSignal {
    id: u64,
    driver: Arc<Driver>,
}

impl WaitSignal for DriverSignal {
    fn signal(&self) {
        self.driver.notify();
    }

    fn id(&self) -> u64 {
        self.id
    }
}

fn next_signal_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

struct ConditionEntry {
    condition: Arc<dyn Condition>,
    signal: Arc<DriverSignal>,
}

/// WaitSet - wait for multiple conditions.
///
/// `wait` blocks until at least one attached condition has
/// `trigger_value == true` or the deadline elapses.
pub struct WaitSet {
    driver: Arc<Driver>,
    entries: Mutex<Vec<ConditionEntry>>,
}

impl WaitSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            driver: Arc::new(Driver {
                wakes: Mutex::new(0),
                cond: Condvar::new(),
            }),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Attach a condition.
    ///
    /// # Errors
    ///
    /// `Error::PreconditionNotMet` when the condition is already attached.
    pub fn attach_condition(&self, condition: Arc<dyn Condition>) -> Result<()> {
        let condition_id = condition.condition_id();
        let mut entries = self.entries.lock();
        if entries
            .iter()
            .any(|e| e.condition.condition_id() == condition_id)
        {
            return Err(Error::PreconditionNotMet(
                "condition already attached to this waitset".into(),
            ));
        }

        let signal = Arc::new(DriverSignal {
            id: next_signal_id(),
            driver: Arc::clone(&self.driver),
        });
        condition.add_waitset_signal(signal.clone());
        entries.push(ConditionEntry { condition, signal });
        Ok(())
    }

    /// Detach a condition.
    ///
    /// # Errors
    ///
    /// `Error::PreconditionNotMet` when the condition is not attached.
    pub fn detach_condition(&self, condition: &Arc<dyn Condition>) -> Result<()> {
        let condition_id = condition.condition_id();
        let mut entries = self.entries.lock();
        let idx = entries
            .iter()
            .position(|e| e.condition.condition_id() == condition_id)
            .ok_or_else(|| {
                Error::PreconditionNotMet("condition not attached to this waitset".into())
            })?;
        let entry = entries.remove(idx);
        entry.condition.remove_waitset_signal(entry.signal.id());
        Ok(())
    }

    /// All attached conditions.
    #[must_use]
    pub fn get_conditions(&self) -> Vec<Arc<dyn Condition>> {
        self.entries
            .lock()
            .iter()
            .map(|e| Arc::clone(&e.condition))
            .collect()
    }

    /// Block until a condition triggers or the deadline elapses.
    ///
    /// # Errors
    ///
    /// `Error::Timeout` when no condition triggered within `timeout`.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Vec<Arc<dyn Condition>>> {
        let start = Instant::now();

        loop {
            let triggered = self.collect_triggered();
            if !triggered.is_empty() {
                return Ok(triggered);
            }

            let mut wakes = self.driver.wakes.lock();
            // Re-check under the lock: a signal may have landed between the
            // trigger scan and acquiring the wake counter.
            let seen = *wakes;
            drop(wakes);
            let triggered = self.collect_triggered();
            if !triggered.is_empty() {
                return Ok(triggered);
            }
            wakes = self.driver.wakes.lock();
            if *wakes != seen {
                continue;
            }

            match timeout {
                Some(total) => {
                    let elapsed = start.elapsed();
                    if elapsed >= total {
                        return Err(Error::Timeout);
                    }
                    let timed_out = self
                        .driver
                        .cond
                        .wait_for(&mut wakes, total - elapsed)
                        .timed_out();
                    if timed_out && self.collect_triggered().is_empty() {
                        return Err(Error::Timeout);
                    }
                }
                None => {
                    self.driver.cond.wait(&mut wakes);
                }
            }
        }
    }

    /// Wake a blocked `wait` without triggering any condition.
    pub fn notify(&self) {
        self.driver.notify();
    }

    fn collect_triggered(&self) -> Vec<Arc<dyn Condition>> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.condition.get_trigger_value())
            .map(|e| Arc::clone(&e.condition))
            .collect()
    }
}

impl Default for WaitSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WaitSet {
    fn drop(&mut self) {
        let mut entries = self.entries.lock();
        for entry in entries.drain(..) {
            entry.condition.remove_waitset_signal(entry.signal.id());
        }
    }
}
