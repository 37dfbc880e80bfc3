//! Store keys: opaque byte strings of bounded length.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CodecError;

/// Maximum length of a store key in bytes.
pub const MAX_KEY_LEN: usize = 250;

/// An opaque byte-string key, 0–250 bytes.
///
/// Keys sort bytewise, which is also the order regions and the tree use.
/// Exclusive right bounds produced by [`StoreKey::successor`] may exceed
/// the limit by one byte; they never name a stored key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct StoreKey(Vec<u8>);

impl StoreKey {
    /// The smallest key: the empty byte string.
    pub fn min() -> StoreKey {
        StoreKey(Vec::new())
    }

    /// Validating constructor; rejects keys longer than [`MAX_KEY_LEN`].
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<StoreKey, CodecError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_KEY_LEN {
            return Err(CodecError::KeyTooLong(bytes.len()));
        }
        Ok(StoreKey(bytes))
    }

    /// Unvalidated constructor for interval-bound keys, which may be one
    /// byte longer than a storable key.
    pub fn from_bound_bytes(bytes: Vec<u8>) -> StoreKey {
        StoreKey(bytes)
    }

    /// The immediate successor in the bytewise order: `k ++ [0x00]`.
    /// `[k, k]` closed-closed normalizes to `[k, k.successor())`.
    pub fn successor(&self) -> StoreKey {
        let mut bytes = Vec::with_capacity(self.0.len() + 1);
        bytes.extend_from_slice(&self.0);
        bytes.push(0x00);
        StoreKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for StoreKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if (0x20..0x7f).contains(&b) {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey(\"{self}\")")
    }
}
