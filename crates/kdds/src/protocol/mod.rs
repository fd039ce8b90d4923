// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! RTPS wire protocol: message/submessage framing, sequence and fragment
//! number sets, and the ParticipantMessageData payload.
//!
//! Bit-exact with OMG RTPS 2.x at the submessage level; everything below
//! (UDP framing, locators) lives outside this crate.

pub mod cdr;
pub mod constants;
mod pmd;
mod seqset;
mod submessage;

pub use pmd::{ParticipantMessageData, PmdKind};
pub use seqset::{FragmentNumberSet, SequenceNumberSet, MAX_BITMAP_BITS};
pub use submessage::{
    build_message, parse_message, AckNack, Data, DataFrag, Gap, Heartbeat, HeartbeatFrag, InfoDst,
    InfoSrc, InfoTs, MessageHeader, NackFrag, Parameter, ParsedMessage, Submessage,
};
