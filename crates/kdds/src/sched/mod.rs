// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Timed-event queue: a monotonic timer heap plus a FIFO of non-timed
//! messages, served by a dedicated worker thread.
//!
//! Deadlines are absolute monotonic nanoseconds. Rescheduling to an
//! earlier time wakes the worker; rescheduling to [`MONO_TIME_DELETE`]
//! guarantees the event is the next to run and is freed without firing.
//! A rounding knob snaps deadlines to a coarser grid to reduce wakeups.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::{Condvar, Mutex};

use crate::core::types::{duration_to_nanos, mono_now, MonoTime, MONO_TIME_DELETE};

/// What a timed event does after firing.
pub enum EventDisposition {
    /// Free the event.
    Done,
    /// Re-arm at the given absolute deadline.
    ResumeAt(MonoTime),
}

/// Timed-event callback; receives the current monotonic time.
pub type EventCallback = Box<dyn FnMut(MonoTime) -> EventDisposition + Send>;

/// Non-timed message (user write, incoming protocol message).
pub type Message = Box<dyn FnOnce() + Send>;

/// Handle for rescheduling or deleting a timed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

struct TimedEvent {
    deadline: MonoTime,
    callback: EventCallback,
}

struct QueueInner {
    heap: BinaryHeap<Reverse<(MonoTime, u64)>>,
    events: HashMap<u64, TimedEvent>,
    next_id: u64,
    shutdown: bool,
}

/// Timer heap + message FIFO.
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    cond: Condvar,
    msg_tx: Sender<Message>,
    msg_rx: Receiver<Message>,
    /// Deadline grid in nanoseconds (1 = no rounding).
    round_to: i64,
}

impl EventQueue {
    #[must_use]
    pub fn new(round_to: Duration) -> Self {
        let (msg_tx, msg_rx) = channel::unbounded();
        Self {
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::new(),
                events: HashMap::new(),
                next_id: 1,
                shutdown: false,
            }),
            cond: Condvar::new(),
            msg_tx,
            msg_rx,
            round_to: duration_to_nanos(round_to).max(1),
        }
    }

    fn round(&self, deadline: MonoTime) -> MonoTime {
        if deadline == MONO_TIME_DELETE || self.round_to <= 1 {
            return deadline;
        }
        // Snap up to the grid so events never fire early.
        match deadline.checked_add(self.round_to - 1) {
            Some(padded) => (padded / self.round_to) * self.round_to,
            None => deadline,
        }
    }

    /// Schedule a timed event.
    pub fn schedule(&self, deadline: MonoTime, callback: EventCallback) -> EventHandle {
        let deadline = self.round(deadline);
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.events.insert(id, TimedEvent { deadline, callback });
        inner.heap.push(Reverse((deadline, id)));
        drop(inner);
        // The new event may be earlier than what the worker sleeps on.
        self.cond.notify_all();
        EventHandle(id)
    }

    /// Move an event to a new deadline.
    ///
    /// [`MONO_TIME_DELETE`] marks deletion: the event becomes the next to
    /// run and is freed without firing. Rescheduling an already-freed
    /// event is a no-op.
    pub fn reschedule(&self, handle: EventHandle, deadline: MonoTime) {
        let deadline = self.round(deadline);
        let mut inner = self.inner.lock();
        if let Some(event) = inner.events.get_mut(&handle.0) {
            event.deadline = deadline;
            inner.heap.push(Reverse((deadline, handle.0)));
            drop(inner);
            self.cond.notify_all();
        }
    }

    /// Enqueue a non-timed message.
    pub fn post(&self, message: Message) {
        if self.msg_tx.send(message).is_err() {
            log::debug!("[EventQueue::post] queue closed, dropping message");
            return;
        }
        self.cond.notify_all();
    }

    /// Number of live timed events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    /// Run every message and every timed event due at `now`.
    ///
    /// Returns the number of callbacks fired. Deleted events are freed
    /// here without firing.
    pub fn process_due(&self, now: MonoTime) -> usize {
        let mut fired = 0;

        // FIFO first: messages order ahead of timers at equal priority.
        loop {
            match self.msg_rx.try_recv() {
                Ok(message) => {
                    message();
                    fired += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        loop {
            let mut inner = self.inner.lock();
            let Some(&Reverse((deadline, id))) = inner.heap.peek() else {
                break;
            };
            if deadline != MONO_TIME_DELETE && deadline > now {
                break;
            }
            inner.heap.pop();

            // Lazy deletion: heap entries whose deadline no longer matches
            // the event are stale duplicates from a reschedule.
            let current = inner.events.get(&id).map(|e| e.deadline);
            if current != Some(deadline) {
                continue;
            }
            if deadline == MONO_TIME_DELETE {
                inner.events.remove(&id);
                continue;
            }

            // Fire outside the lock.
            let Some(mut event) = inner.events.remove(&id) else {
                continue;
            };
            drop(inner);
            let disposition = (event.callback)(now);
            fired += 1;

            match disposition {
                EventDisposition::Done => {}
                EventDisposition::ResumeAt(next) => {
                    let next = self.round(next);
                    let mut inner = self.inner.lock();
                    // A concurrent delete wins over re-arming.
                    event.deadline = next;
                    inner.events.insert(id, event);
                    inner.heap.push(Reverse((next, id)));
                }
            }
        }

        fired
    }

    /// Earliest pending deadline (ignoring stale heap entries).
    #[must_use]
    pub fn next_deadline(&self) -> Option<MonoTime> {
        self.inner.lock().events.values().map(|e| e.deadline).min()
    }

    /// Worker loop: serve the queue until `shutdown` is called.
    pub fn run_worker(&self) {
        loop {
            self.process_due(mono_now());

            let mut inner = self.inner.lock();
            if inner.shutdown {
                return;
            }
            let next = inner.events.values().map(|e| e.deadline).min();
            let wait = match next {
                Some(deadline) => {
                    let now = mono_now();
                    if deadline <= now {
                        continue;
                    }
                    Duration::from_nanos((deadline - now) as u64)
                }
                // Idle: wake on the next schedule/post/shutdown.
                None => Duration::from_millis(100),
            };
            let _ = self.cond.wait_for(&mut inner, wait);
        }
    }

    /// Stop the worker loop at its next tick. Pending timed events are
    /// cancelled (never fire); already-posted messages still drain.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        inner.events.clear();
        inner.heap.clear();
        drop(inner);
        self.cond.notify_all();
    }
}
