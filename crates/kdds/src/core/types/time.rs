// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Wall-clock timestamps and the monotonic clock used by the event queue.
//!
//! Wall-clock values travel on the wire as RTPS Time_t (seconds + 2^-32
//! fraction). All protocol deadlines use the monotonic clock, stored as
//! absolute nanoseconds in `i64` so that `i64::MIN` can double as the
//! delete marker for scheduled events.

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source timestamp: nanoseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    nanos: u64,
}

impl Timestamp {
    /// Timestamp of the current system time.
    #[must_use]
    pub fn now() -> Self {
        let duration = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_else(|_| {
            log::debug!("[time] system clock before UNIX epoch, using timestamp 0");
            Duration::from_secs(0)
        });
        Self {
            nanos: duration.as_nanos() as u64,
        }
    }

    /// Construct from nanoseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Construct from RTPS Time_t (seconds + 2^-32 fraction).
    #[must_use]
    pub fn from_rtps(seconds: i32, fraction: u32) -> Self {
        let nanos_from_secs = i64::from(seconds).max(0) as u64 * 1_000_000_000;
        let nanos_from_fraction = (u64::from(fraction) * 1_000_000_000) >> 32;
        Self {
            nanos: nanos_from_secs + nanos_from_fraction,
        }
    }

    /// Nanoseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Convert to RTPS Time_t (seconds, 2^-32 fraction).
    #[must_use]
    pub fn to_rtps(&self) -> (i32, u32) {
        let seconds_total = self.nanos / 1_000_000_000;
        let seconds = match i32::try_from(seconds_total) {
            Ok(value) => value,
            Err(_) => {
                log::debug!("[time] timestamp {}ns exceeds RTPS seconds range; clamping", self.nanos);
                i32::MAX
            }
        };

        let remainder = self.nanos % 1_000_000_000;
        let fraction = ((remainder << 32) / 1_000_000_000) as u32;
        (seconds, fraction)
    }
}

/// Absolute monotonic time in nanoseconds since process start.
pub type MonoTime = i64;

/// Marker deadline for "delete this event without firing it".
pub const MONO_TIME_DELETE: MonoTime = i64::MIN;

fn mono_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Current monotonic time in nanoseconds.
///
/// The epoch is the first call in the process, so values are small
/// positive numbers and never collide with [`MONO_TIME_DELETE`].
#[must_use]
pub fn mono_now() -> MonoTime {
    let elapsed = mono_epoch().elapsed();
    i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX)
}

/// Convert a `Duration` to monotonic nanoseconds, saturating.
#[must_use]
pub fn duration_to_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}
