//! Backfill chunks: the incremental deltas streamed between replicas.
//!
//! Wire format is a tagged union:
//! `0` delete-range (region encoding), `1` delete-key (key, recency),
//! `2` set-key (key, framed value, flags, exptime, cas, recency).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::CodecError;
use crate::key::StoreKey;
use crate::region::Region;
use crate::types::{Cas, StateTimestamp};

const TAG_DELETE_RANGE: u8 = 0;
const TAG_DELETE_KEY: u8 = 1;
const TAG_SET_KEY: u8 = 2;

/// A live key/value with its mutation metadata, as shipped by backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillAtom {
    pub key: StoreKey,
    pub value: Bytes,
    pub flags: u32,
    pub exptime: u32,
    /// The source's cas for this key, or `Cas::INVALID` if none was minted.
    pub cas_or_zero: Cas,
    pub recency: StateTimestamp,
}

/// One unit of the backfill stream, emitted in ascending key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackfillChunk {
    /// The receiver must erase every key in `region`; the live contents
    /// follow as set-key chunks.
    DeleteRange { region: Region },
    /// A deletion newer than the receiver's start point.
    DeleteKey {
        key: StoreKey,
        recency: StateTimestamp,
    },
    /// A live key newer than the receiver's start point.
    SetKey { atom: BackfillAtom },
}

impl BackfillChunk {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            BackfillChunk::DeleteRange { region } => {
                codec::put_u8(&mut buf, TAG_DELETE_RANGE);
                codec::encode_region(&mut buf, region);
            }
            BackfillChunk::DeleteKey { key, recency } => {
                codec::put_u8(&mut buf, TAG_DELETE_KEY);
                codec::put_bytes(&mut buf, key.as_bytes());
                codec::put_u64(&mut buf, recency.0);
            }
            BackfillChunk::SetKey { atom } => {
                codec::put_u8(&mut buf, TAG_SET_KEY);
                codec::put_bytes(&mut buf, atom.key.as_bytes());
                codec::put_framed_buffer(&mut buf, Some(&atom.value));
                codec::put_u32(&mut buf, atom.flags);
                codec::put_u32(&mut buf, atom.exptime);
                codec::put_u64(&mut buf, atom.cas_or_zero.0);
                codec::put_u64(&mut buf, atom.recency.0);
            }
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<BackfillChunk, CodecError> {
        let mut input = bytes;
        let chunk = match codec::get_u8(&mut input)? {
            TAG_DELETE_RANGE => BackfillChunk::DeleteRange {
                region: codec::decode_region(&mut input)?,
            },
            TAG_DELETE_KEY => BackfillChunk::DeleteKey {
                key: StoreKey::new(codec::get_bytes(&mut input)?)?,
                recency: StateTimestamp(codec::get_u64(&mut input)?),
            },
            TAG_SET_KEY => {
                let key = StoreKey::new(codec::get_bytes(&mut input)?)?;
                let value = codec::get_framed_buffer(&mut input)?
                    .ok_or_else(|| CodecError::Snapshot("set-key chunk without value".into()))?;
                BackfillChunk::SetKey {
                    atom: BackfillAtom {
                        key,
                        value,
                        flags: codec::get_u32(&mut input)?,
                        exptime: codec::get_u32(&mut input)?,
                        cas_or_zero: Cas(codec::get_u64(&mut input)?),
                        recency: StateTimestamp(codec::get_u64(&mut input)?),
                    },
                }
            }
            other => return Err(CodecError::BadChunkTag(other)),
        };
        if !input.is_empty() {
            return Err(CodecError::Snapshot(format!(
                "{} trailing bytes after chunk",
                input.len()
            )));
        }
        Ok(chunk)
    }
}
