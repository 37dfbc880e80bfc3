//! The store-view contract consumed by the cluster layer.

use bytes::Bytes;

use shrike_common::chunk::BackfillChunk;
use shrike_common::query::{ReadQuery, ReadResponse, WriteQuery, WriteResponse};
use shrike_common::region::Region;
use shrike_common::{Cas, Interruptor, RegionMap, ShrikeResult, StateTimestamp};

use crate::backfill::{BackfillProgress, ChunkSink};
use crate::fifo::{ReadToken, WriteToken};

/// One shard's storage surface.
///
/// Tokens are reserved up front (fixing the issue order) and consumed by
/// the operation they are presented to; the cluster layer may pipeline
/// many reservations ahead of the operations themselves. Every blocking
/// method takes an interruptor and fails with `Interrupted` when it
/// fires, releasing all scoped resources.
pub trait StoreView {
    fn new_read_token(&self) -> ReadToken;

    fn new_write_token(&self) -> WriteToken;

    /// Load the persisted metainfo map; its domain is always the
    /// universe.
    fn get_metainfo(
        &self,
        token: ReadToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<RegionMap<Bytes>>;

    /// Overlay `new` onto the persisted metainfo.
    fn set_metainfo(
        &self,
        new: &RegionMap<Bytes>,
        token: WriteToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<()>;

    /// Execute a read after verifying the caller's metainfo expectation
    /// over the expectation's domain.
    fn read(
        &self,
        expected_metainfo: &RegionMap<Bytes>,
        query: &ReadQuery,
        effective_time: u32,
        token: ReadToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<ReadResponse>;

    /// Execute a write, atomically checking the expectation and
    /// overlaying `new_metainfo` in the same transaction.
    ///
    /// `proposed_cas` is the caller-minted cas, supplied by the master
    /// so every replica replaying this write stamps the same value;
    /// `Cas::INVALID` means "do not mint here" and lets the engine mint
    /// from its own source. Deletes must pass `Cas::INVALID`.
    #[allow(clippy::too_many_arguments)]
    fn write(
        &self,
        expected_metainfo: &RegionMap<Bytes>,
        new_metainfo: &RegionMap<Bytes>,
        query: &WriteQuery,
        timestamp: StateTimestamp,
        proposed_cas: Cas,
        effective_time: u32,
        token: WriteToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<WriteResponse>;

    /// Stream the chunks that bring a replica from `start_point` up to
    /// this store's current state. Returns `false` without traversing
    /// when `should_backfill` declines the masked metainfo.
    #[allow(clippy::too_many_arguments)]
    fn send_backfill(
        &self,
        start_point: &RegionMap<StateTimestamp>,
        should_backfill: &mut dyn FnMut(&RegionMap<Bytes>) -> bool,
        sink: &mut dyn ChunkSink,
        progress: &BackfillProgress,
        token: ReadToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<bool>;

    /// Apply one received chunk under a write token.
    fn receive_backfill(
        &self,
        chunk: &BackfillChunk,
        token: WriteToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<()>;

    /// Overlay `new_metainfo` and wipe `subregion`, in one transaction.
    fn reset_data(
        &self,
        subregion: &Region,
        new_metainfo: &RegionMap<Bytes>,
        token: WriteToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<()>;
}
