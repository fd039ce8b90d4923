// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! # KDDS - DDS reliability and sample-state kernel
//!
//! A pure Rust implementation of the engineering core every DDS middleware
//! shares: the per-endpoint reliability and sample-state engine, and the
//! matching engine that couples writers to readers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kdds::{Participant, QosProfile, Result, TopicType};
//!
//! fn main() -> Result<()> {
//!     let participant = Participant::new();
//!     let writer = participant.create_writer::<Reading>("sensors/temp", QosProfile::reliable())?;
//!     let reader = participant.create_reader::<Reading>("sensors/temp", QosProfile::reliable())?;
//!
//!     writer.write(&Reading { sensor: 1, value: 21 })?;
//!     for sample in reader.take(16)? {
//!         println!("{:?}", sample.value);
//!     }
//!     Ok(())
//! }
//! # #[derive(Debug, Default)] struct Reading { sensor: u32, value: i64 }
//! # impl TopicType for Reading {
//! #     fn type_name() -> &'static str { "Reading" }
//! #     fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
//! #         buf.extend_from_slice(&self.sensor.to_le_bytes());
//! #         buf.extend_from_slice(&self.value.to_le_bytes());
//! #         Ok(())
//! #     }
//! #     fn decode(buf: &[u8]) -> Result<Self> {
//! #         Ok(Self {
//! #             sensor: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
//! #             value: i64::from_le_bytes(buf[4..12].try_into().unwrap()),
//! #         })
//! #     }
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                          DDS surface                               |
//! |  Participant -> DataWriter/DataReader | QoS | Statuses | WaitSets  |
//! +--------------------------------------------------------------------+
//! |                      Sample-state engine                           |
//! |  Writer History Cache | Reader History Cache | Instance states     |
//! +--------------------------------------------------------------------+
//! |                    Reliable-delivery engine                        |
//! |  Heartbeat/AckNack/Gap/NackFrag | Defrag | Reorder | Rexmit queue  |
//! +--------------------------------------------------------------------+
//! |                  Matching & liveliness engine                      |
//! |  QoS compatibility | Match registry | Leases | PMD scheduling      |
//! +--------------------------------------------------------------------+
//! ```
//!
//! Wire framing is bit-exact with OMG RTPS 2.x at the submessage level
//! ([`protocol`]); socket I/O and discovery live outside this crate - the
//! in-process [`matching`] registry stands in as the source of match
//! events.
//!
//! ## Modules Overview
//!
//! - [`dds`] - public surface (start here)
//! - [`whc`] / [`rhc`] - writer and reader history caches
//! - [`reliability`] - the Heartbeat/AckNack/Gap/NackFrag state machines
//! - [`frag`] - defragmentation and reordering
//! - [`matching`] - QoS matching and liveliness leases
//! - [`sched`] - the timed-event queue
//! - [`protocol`] - RTPS submessage codecs

/// Core vocabulary: identifiers, clocks, serialized-data handles.
pub mod core;
/// Public DDS surface (entities, QoS, statuses, conditions, waitsets).
pub mod dds;
/// Fragment reassembly and sample reordering.
pub mod frag;
/// QoS matching, the in-process match registry, liveliness leases.
pub mod matching;
/// RTPS wire protocol (submessages, bitmaps, PMD).
pub mod protocol;
/// Reliable-delivery state machines and the retransmit queue.
pub mod reliability;
/// Reader history cache.
pub mod rhc;
/// Timed-event queue (timer heap + message FIFO).
pub mod sched;
/// Writer history cache.
pub mod whc;

pub use crate::core::data::{SampleData, SampleDataKind, TopicType};
pub use crate::core::types::{
    EntityId, FragmentNumber, Guid, InstanceHandle, KeyHash, SequenceNumber, Timestamp,
};
pub use dds::{
    DataReader, DataWriter, Error, Participant, QosProfile, ReadMask, Result, Sample, WaitSet,
};

/// KDDS version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
