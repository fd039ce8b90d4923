// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! ParticipantMessageData: the liveliness heartbeat payload carried by the
//! builtin participant-message endpoints.
//!
//! Wire layout: 16-byte participant id + 4-byte big-endian kind +
//! 4-byte length-prefixed value.

use super::constants::{PMD_KIND_AUTOMATIC_LIVELINESS_UPDATE, PMD_KIND_MANUAL_LIVELINESS_UPDATE};
use crate::core::types::Guid;

/// Liveliness update kind announced by a PMD sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmdKind {
    AutomaticLivelinessUpdate,
    ManualLivelinessUpdate,
    /// Unrecognized kind (forward compatibility): preserved verbatim.
    Other(u32),
}

impl PmdKind {
    #[must_use]
    pub fn to_wire(self) -> u32 {
        match self {
            PmdKind::AutomaticLivelinessUpdate => PMD_KIND_AUTOMATIC_LIVELINESS_UPDATE,
            PmdKind::ManualLivelinessUpdate => PMD_KIND_MANUAL_LIVELINESS_UPDATE,
            PmdKind::Other(raw) => raw,
        }
    }

    #[must_use]
    pub fn from_wire(raw: u32) -> Self {
        match raw {
            PMD_KIND_AUTOMATIC_LIVELINESS_UPDATE => PmdKind::AutomaticLivelinessUpdate,
            PMD_KIND_MANUAL_LIVELINESS_UPDATE => PmdKind::ManualLivelinessUpdate,
            other => PmdKind::Other(other),
        }
    }
}

/// ParticipantMessageData payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantMessageData {
    /// Full GUID of the asserting participant.
    pub participant: Guid,
    pub kind: PmdKind,
    pub value: Vec<u8>,
}

impl ParticipantMessageData {
    #[must_use]
    pub fn new(participant: Guid, kind: PmdKind) -> Self {
        Self {
            participant,
            kind,
            value: Vec::new(),
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + 4 + 4 + self.value.len());
        buf.extend_from_slice(&self.participant.as_bytes());
        buf.extend_from_slice(&self.kind.to_wire().to_be_bytes());
        buf.extend_from_slice(&(self.value.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.value);
        buf
    }

    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < 24 {
            return None;
        }
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&buf[0..16]);
        let kind = u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]);
        let len = u32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]) as usize;
        if buf.len() < 24 + len {
            return None;
        }
        Some(Self {
            participant: Guid::from_bytes(guid),
            kind: PmdKind::from_wire(kind),
            value: buf[24..24 + len].to_vec(),
        })
    }
}
