// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 kdds developers

//! Serialized-data handle: the reference-counted, immutable representation
//! of one sample as it travels between the writer history cache, the
//! delivery machinery and the reader history cache.

use std::sync::Arc;

use super::types::{KeyHash, Timestamp};
use crate::dds::{Error, Result};

/// Statusinfo bit: the sample disposes its instance.
pub const STATUSINFO_DISPOSE: u8 = 0x01;
/// Statusinfo bit: the sample unregisters its instance.
pub const STATUSINFO_UNREGISTER: u8 = 0x02;

/// Topic type contract: CDR encode/decode plus key access.
///
/// The key methods drive instance lookup: `encode_key` serializes only the
/// user-declared key fields (stable byte order), and `decode_key` rebuilds a
/// value from key fields alone with every non-key field defaulted. Keyless
/// topics keep the default no-op key methods.
pub trait TopicType: Sized + Send + Sync + 'static {
    /// Registered type name.
    fn type_name() -> &'static str;

    /// Encode the full sample to CDR bytes.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the value cannot be represented.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode a full sample from CDR bytes.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the buffer is truncated or malformed.
    fn decode(buf: &[u8]) -> Result<Self>;

    /// Whether the type declares key fields.
    fn has_key() -> bool {
        false
    }

    /// Encode only the key fields.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the value cannot be represented.
    fn encode_key(&self, _buf: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    /// Rebuild a value from key fields alone (non-key fields defaulted).
    ///
    /// # Errors
    ///
    /// Returns `Err` for keyless types or malformed key bytes.
    fn decode_key(_buf: &[u8]) -> Result<Self> {
        Err(Error::IllegalOperation(
            "type has no key; cannot rebuild from key bytes".into(),
        ))
    }
}

/// What a serialized sample carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDataKind {
    /// Full payload (a `write`).
    Data,
    /// Key fields only (dispose/unregister, or a key-only resend).
    Key,
    /// Neither payload nor key (placeholder, e.g. a heartbeat-only change).
    Empty,
}

#[derive(Debug)]
struct SampleDataInner {
    kind: SampleDataKind,
    /// CDR payload; empty for `Key` and `Empty` kinds.
    payload: Box<[u8]>,
    /// Serialized key fields; empty for keyless topics and `Empty` kind.
    key: Box<[u8]>,
    key_hash: KeyHash,
    timestamp: Timestamp,
    statusinfo: u8,
}

/// Reference-counted serialized sample.
///
/// Immutable after construction. Cloning is cheap (pointer bump); every
/// subsystem that needs the bytes holds its own handle.
#[derive(Debug, Clone)]
pub struct SampleData {
    inner: Arc<SampleDataInner>,
}

impl SampleData {
    /// Serialize a user sample for the publish path.
    ///
    /// `Data` kind encodes the full payload; `Key` encodes only key fields
    /// (the dispose/unregister path); `Empty` carries nothing.
    ///
    /// # Errors
    ///
    /// Propagates encode failures from the topic type.
    pub fn from_sample<T: TopicType>(
        value: &T,
        kind: SampleDataKind,
        timestamp: Timestamp,
    ) -> Result<Self> {
        let mut payload = Vec::new();
        if matches!(kind, SampleDataKind::Data) {
            value.encode(&mut payload)?;
        }

        let mut key = Vec::new();
        if T::has_key() && !matches!(kind, SampleDataKind::Empty) {
            value.encode_key(&mut key)?;
        }
        let key_hash = if T::has_key() {
            KeyHash::from_key_bytes(&key)
        } else {
            KeyHash::NONE
        };

        Ok(Self {
            inner: Arc::new(SampleDataInner {
                kind,
                payload: payload.into_boxed_slice(),
                key: key.into_boxed_slice(),
                key_hash,
                timestamp,
                statusinfo: 0,
            }),
        })
    }

    /// Construct from raw wire bytes on the receive path.
    #[must_use]
    pub fn from_wire(
        kind: SampleDataKind,
        payload: Vec<u8>,
        key: Vec<u8>,
        key_hash: KeyHash,
        timestamp: Timestamp,
        statusinfo: u8,
    ) -> Self {
        Self {
            inner: Arc::new(SampleDataInner {
                kind,
                payload: payload.into_boxed_slice(),
                key: key.into_boxed_slice(),
                key_hash,
                timestamp,
                statusinfo,
            }),
        }
    }

    /// Copy of this handle with the given statusinfo bits.
    ///
    /// Handles are immutable, so this allocates a new inner when the bits
    /// differ. Used by dispose/unregister which reuse the key encoding.
    #[must_use]
    pub fn with_statusinfo(&self, statusinfo: u8) -> Self {
        if self.inner.statusinfo == statusinfo {
            return self.clone();
        }
        Self {
            inner: Arc::new(SampleDataInner {
                kind: self.inner.kind,
                payload: self.inner.payload.clone(),
                key: self.inner.key.clone(),
                key_hash: self.inner.key_hash,
                timestamp: self.inner.timestamp,
                statusinfo,
            }),
        }
    }

    /// Copy of this handle with a different timestamp.
    #[must_use]
    pub fn with_timestamp(&self, timestamp: Timestamp) -> Self {
        Self {
            inner: Arc::new(SampleDataInner {
                kind: self.inner.kind,
                payload: self.inner.payload.clone(),
                key: self.inner.key.clone(),
                key_hash: self.inner.key_hash,
                timestamp,
                statusinfo: self.inner.statusinfo,
            }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> SampleDataKind {
        self.inner.kind
    }

    /// Borrow `len` payload bytes starting at `off` for zero-copy transmit.
    ///
    /// Returns `None` when the range falls outside the payload.
    #[must_use]
    pub fn to_iovec(&self, off: usize, len: usize) -> Option<&[u8]> {
        let end = off.checked_add(len)?;
        self.inner.payload.get(off..end)
    }

    /// Deserialize into a user sample.
    ///
    /// `Data` decodes the payload; `Key` rebuilds from key fields. `Empty`
    /// carries nothing to decode.
    ///
    /// # Errors
    ///
    /// Propagates decode failures; `Empty` yields `PreconditionNotMet`.
    pub fn to_sample<T: TopicType>(&self) -> Result<T> {
        match self.inner.kind {
            SampleDataKind::Data => T::decode(&self.inner.payload),
            SampleDataKind::Key => T::decode_key(&self.inner.key),
            SampleDataKind::Empty => Err(Error::PreconditionNotMet(
                "empty sample has no decodable content".into(),
            )),
        }
    }

    #[must_use]
    pub fn key_hash(&self) -> KeyHash {
        self.inner.key_hash
    }

    /// Serialized key fields (empty for keyless topics).
    #[must_use]
    pub fn key_bytes(&self) -> &[u8] {
        &self.inner.key
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.inner.timestamp
    }

    #[must_use]
    pub fn statusinfo(&self) -> u8 {
        self.inner.statusinfo
    }

    #[must_use]
    pub fn is_dispose(&self) -> bool {
        self.inner.statusinfo & STATUSINFO_DISPOSE != 0
    }

    #[must_use]
    pub fn is_unregister(&self) -> bool {
        self.inner.statusinfo & STATUSINFO_UNREGISTER != 0
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.payload.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.payload.is_empty()
    }

    /// Full payload slice.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.inner.payload
    }
}
