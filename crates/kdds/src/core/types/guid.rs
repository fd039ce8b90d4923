// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! RTPS GUID (Globally Unique Identifier) implementation.

use std::fmt;

/// RTPS entity identifier (4 bytes: 3-byte key + 1-byte kind).
pub type EntityId = [u8; 4];

/// Participant prefix length (12 bytes).
pub const GUID_PREFIX_LEN: usize = 12;

/// RTPS GUID (Globally Unique Identifier)
///
/// 16-byte endpoint identifier following DDS-RTPS v2.x:
/// 12-byte participant prefix + 4-byte entity id.
///
/// # Display Format
/// Hex with dots: "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.c1"
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Guid {
    pub prefix: [u8; GUID_PREFIX_LEN],
    pub entity_id: EntityId,
}

impl Guid {
    /// Create GUID from separate prefix and entity id.
    #[must_use]
    pub const fn new(prefix: [u8; GUID_PREFIX_LEN], entity_id: EntityId) -> Self {
        Self { prefix, entity_id }
    }

    /// Create GUID from raw bytes (16 bytes total).
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut prefix = [0u8; GUID_PREFIX_LEN];
        let mut entity_id = [0u8; 4];
        prefix.copy_from_slice(&bytes[0..12]);
        entity_id.copy_from_slice(&bytes[12..16]);
        Self { prefix, entity_id }
    }

    /// Convert GUID to 16-byte array.
    #[must_use]
    pub fn as_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..12].copy_from_slice(&self.prefix);
        bytes[12..16].copy_from_slice(&self.entity_id);
        bytes
    }

    /// Create GUID with all zeros (invalid/placeholder).
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            prefix: [0; GUID_PREFIX_LEN],
            entity_id: [0; 4],
        }
    }

    /// Check if GUID is zero (invalid).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.prefix.iter().all(|&b| b == 0) && self.entity_id.iter().all(|&b| b == 0)
    }

    /// Replace the entity id, keeping the participant prefix.
    #[must_use]
    pub const fn with_entity_id(&self, entity_id: EntityId) -> Self {
        Self {
            prefix: self.prefix,
            entity_id,
        }
    }

    /// Generate a fresh pseudo-random participant prefix.
    ///
    /// Uniqueness comes from a process-wide counter mixed with the process id
    /// and a coarse clock sample. Good enough for in-process domains; a
    /// networked deployment would fold in host identity as well.
    #[must_use]
    pub fn fresh_prefix() -> [u8; GUID_PREFIX_LEN] {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(1);

        let count = COUNTER.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        let clock = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);

        let mut prefix = [0u8; GUID_PREFIX_LEN];
        prefix[0..4].copy_from_slice(&pid.to_be_bytes());
        prefix[4..8].copy_from_slice(&clock.to_be_bytes());
        prefix[8..12].copy_from_slice(&count.to_be_bytes());
        prefix
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
