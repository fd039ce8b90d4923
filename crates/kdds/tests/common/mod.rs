// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Shared helpers for the integration tests: a small keyed topic type and
//! unique topic names (participants in one process share the domain).

use std::sync::atomic::{AtomicU64, Ordering};

use kdds::{Error, Result, TopicType};

/// Keyed test type: `long_1` is the key, the other fields are payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Space {
    pub long_1: i32,
    pub long_2: i32,
    pub long_3: i32,
}

impl Space {
    pub fn new(long_1: i32, long_2: i32, long_3: i32) -> Self {
        Self {
            long_1,
            long_2,
            long_3,
        }
    }
}

impl TopicType for Space {
    fn type_name() -> &'static str {
        "Space"
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.long_1.to_le_bytes());
        buf.extend_from_slice(&self.long_2.to_le_bytes());
        buf.extend_from_slice(&self.long_3.to_le_bytes());
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 12 {
            return Err(Error::BadParameter("Space payload too short".into()));
        }
        let field = |off: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&buf[off..off + 4]);
            i32::from_le_bytes(raw)
        };
        Ok(Self {
            long_1: field(0),
            long_2: field(4),
            long_3: field(8),
        })
    }

    fn has_key() -> bool {
        true
    }

    fn encode_key(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&self.long_1.to_be_bytes());
        Ok(())
    }

    fn decode_key(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(Error::BadParameter("Space key too short".into()));
        }
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&buf[0..4]);
        Ok(Self {
            long_1: i32::from_be_bytes(raw),
            ..Self::default()
        })
    }
}

/// Unique topic name per test: tests in one binary share the domain.
pub fn unique_topic(prefix: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{}", prefix, std::process::id(), n)
}
