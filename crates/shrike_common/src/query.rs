//! The query/mutation algebra and its routing operations.
//!
//! The cluster layer calls `get_region` to find a query's footprint,
//! `shard` to rewrite it for one store's sub-region, and `unshard` to
//! stitch per-shard responses back together. Reads are point gets and
//! range gets; every write targets a single key.
//!
//! The variant set is a closed sum type on purpose: adding a query kind
//! is a breaking change that every dispatch site must acknowledge.

use bytes::Bytes;
use std::fmt;

use crate::error::RoutingError;
use crate::key::StoreKey;
use crate::merge::MergeOrderedIter;
use crate::region::Region;
use crate::types::Cas;

// ── reads ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadQuery {
    /// Point lookup.
    Get { key: StoreKey },
    /// Range lookup over a canonical region.
    Rget { range: Region },
}

impl ReadQuery {
    /// The region this read touches: `[key, key]` for a point get, the
    /// canonical range for an rget.
    pub fn get_region(&self) -> Region {
        match self {
            ReadQuery::Get { key } => Region::point(key),
            ReadQuery::Rget { range } => range.clone(),
        }
    }

    /// Rewrite for the sub-region `region` owned by one shard.
    ///
    /// A point get only shards to its own region; an rget shards to any
    /// sub-region of its range, and the result is expressed in canonical
    /// form so the backend sees the same shape however the caller phrased
    /// its bounds.
    pub fn shard(&self, region: &Region) -> Result<ReadQuery, RoutingError> {
        match self {
            ReadQuery::Get { key } => {
                if region != &Region::point(key) {
                    return Err(RoutingError::RegionMismatch {
                        context: format!("point get on {key} sharded to {region}"),
                    });
                }
                Ok(self.clone())
            }
            ReadQuery::Rget { range } => {
                if !range.is_superset(region) {
                    return Err(RoutingError::RegionMismatch {
                        context: format!("rget over {range} sharded to non-subregion {region}"),
                    });
                }
                Ok(ReadQuery::Rget {
                    range: region.clone(),
                })
            }
        }
    }

    /// Stitch per-shard responses back into one response.
    ///
    /// Point gets expect exactly one response; rgets merge the per-shard
    /// lazy sequences into a single globally ascending sequence.
    pub fn unshard(&self, responses: Vec<ReadResponse>) -> Result<ReadResponse, RoutingError> {
        match self {
            ReadQuery::Get { .. } => {
                let got = responses.len();
                let mut responses = responses;
                match (responses.pop(), got) {
                    (Some(ReadResponse::Get(result)), 1) => Ok(ReadResponse::Get(result)),
                    (Some(_), 1) => Err(RoutingError::InvariantViolated(
                        "point get unsharded a range response".into(),
                    )),
                    _ => Err(RoutingError::ArityMismatch { expected: 1, got }),
                }
            }
            ReadQuery::Rget { .. } => {
                let mut streams = Vec::with_capacity(responses.len());
                for response in responses {
                    match response {
                        ReadResponse::Rget(stream) => streams.push(stream),
                        ReadResponse::Get(_) => {
                            return Err(RoutingError::InvariantViolated(
                                "rget unsharded a point response".into(),
                            ));
                        }
                    }
                }
                Ok(ReadResponse::Rget(RgetStream::new(MergeOrderedIter::new(
                    streams,
                ))))
            }
        }
    }
}

/// A lazy, finite, single-pass sequence of `(key, value)` in ascending
/// key order. Consuming it holds the underlying read snapshot alive
/// until exhausted or dropped.
pub struct RgetStream {
    inner: Box<dyn Iterator<Item = (StoreKey, Bytes)> + Send>,
}

impl RgetStream {
    pub fn new(inner: impl Iterator<Item = (StoreKey, Bytes)> + Send + 'static) -> RgetStream {
        RgetStream {
            inner: Box::new(inner),
        }
    }

    /// Drain into a vector; test and small-result convenience.
    pub fn collect_pairs(self) -> Vec<(StoreKey, Bytes)> {
        self.collect()
    }
}

impl Iterator for RgetStream {
    type Item = (StoreKey, Bytes);

    fn next(&mut self) -> Option<(StoreKey, Bytes)> {
        self.inner.next()
    }
}

impl fmt::Debug for RgetStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgetStream(..)")
    }
}

#[derive(Debug)]
pub enum ReadResponse {
    Get(GetResult),
    Rget(RgetStream),
}

/// Result of a point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    Value { value: Bytes, flags: u32, cas: Cas },
    Miss,
}

// ── writes ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPolicy {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacePolicy {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticKind {
    Incr,
    Decr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendKind {
    Append,
    Prepend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteQuery {
    /// Read the value and mint a cas if none exists yet.
    GetCas { key: StoreKey },
    /// Set/add/replace/cas, depending on the policies and `old_cas`.
    Sarc {
        key: StoreKey,
        data: Bytes,
        flags: u32,
        exptime: u32,
        add_policy: AddPolicy,
        replace_policy: ReplacePolicy,
        /// `Cas::INVALID` skips the compare; otherwise the stored cas
        /// must match or the write reports `Exists`.
        old_cas: Cas,
    },
    IncrDecr {
        key: StoreKey,
        kind: ArithmeticKind,
        amount: u64,
    },
    AppendPrepend {
        key: StoreKey,
        data: Bytes,
        kind: ExtendKind,
    },
    Delete {
        key: StoreKey,
        /// Backfill replay sets this: the deletion must not re-enter the
        /// realtime delete queue owned by the streaming layer.
        suppress_delete_queue: bool,
    },
}

impl WriteQuery {
    pub fn key(&self) -> &StoreKey {
        match self {
            WriteQuery::GetCas { key }
            | WriteQuery::Sarc { key, .. }
            | WriteQuery::IncrDecr { key, .. }
            | WriteQuery::AppendPrepend { key, .. }
            | WriteQuery::Delete { key, .. } => key,
        }
    }

    /// Writes always target exactly their key's region.
    pub fn get_region(&self) -> Region {
        Region::point(self.key())
    }

    /// Writes are single-key: sharding to anything but the full region is
    /// a routing bug.
    pub fn shard(&self, region: &Region) -> Result<WriteQuery, RoutingError> {
        if region != &self.get_region() {
            return Err(RoutingError::RegionMismatch {
                context: format!("write on {} sharded to {region}", self.key()),
            });
        }
        Ok(self.clone())
    }

    /// A write produced exactly one per-shard response.
    pub fn unshard(&self, mut responses: Vec<WriteResponse>) -> Result<WriteResponse, RoutingError> {
        let got = responses.len();
        match (responses.pop(), got) {
            (Some(response), 1) => Ok(response),
            _ => Err(RoutingError::ArityMismatch { expected: 1, got }),
        }
    }
}

/// Result of a sarc write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetResult {
    Stored,
    /// A policy (add/replace) rejected the write.
    NotStored,
    /// `old_cas` did not match the stored cas.
    Exists,
    /// `old_cas` was supplied but the key is absent.
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticResult {
    New(u64),
    NotFound,
    NotNumeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendResult {
    Stored,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResponse {
    GetCas(GetResult),
    Sarc(SetResult),
    IncrDecr(ArithmeticResult),
    AppendPrepend(ExtendResult),
    Delete(DeleteResult),
}
