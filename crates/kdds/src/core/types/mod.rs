// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Identity and index vocabulary shared by every subsystem.

mod guid;
mod key;
mod time;

pub use guid::{EntityId, Guid, GUID_PREFIX_LEN};
pub use key::{InstanceHandle, KeyHash};
pub use time::{duration_to_nanos, mono_now, MonoTime, Timestamp, MONO_TIME_DELETE};

/// Writer sequence number (signed 64-bit, first valid value is 1).
pub type SequenceNumber = i64;

/// First sequence number a writer publishes.
pub const SEQUENCE_NUMBER_MIN: SequenceNumber = 1;

/// Fragment number within a fragmented sample (1-based on the wire).
pub type FragmentNumber = u32;
