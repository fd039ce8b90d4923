// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Instance keys: the stable 128-bit key hash and per-endpoint instance
//! handles derived from it.

use md5::{Digest, Md5};
use std::fmt;

/// 128-bit digest of a topic instance key.
///
/// Per DDSI, the hash is the serialized (big-endian CDR) key fields
/// themselves when they fit in 16 bytes, zero-padded; otherwise the MD5
/// digest of the serialized key. Two handles of the same topic type with
/// equal keys always produce the same hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyHash(pub [u8; 16]);

impl KeyHash {
    /// The hash used for keyless topics (all zeros).
    pub const NONE: KeyHash = KeyHash([0u8; 16]);

    /// Compute the hash of serialized key fields.
    #[must_use]
    pub fn from_key_bytes(key: &[u8]) -> Self {
        let mut out = [0u8; 16];
        if key.len() <= 16 {
            out[..key.len()].copy_from_slice(key);
        } else {
            let digest = Md5::digest(key);
            out.copy_from_slice(&digest);
        }
        KeyHash(out)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Process-local instance handle.
///
/// Opaque 64-bit value allocated per reader (or writer). Stable for the
/// lifetime of the instance; never reused while the endpoint lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(pub u64);

impl InstanceHandle {
    /// The nil handle (never allocated to an instance).
    pub const NIL: InstanceHandle = InstanceHandle(0);

    #[must_use]
    pub const fn is_nil(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ih:{:#x}", self.0)
    }
}
