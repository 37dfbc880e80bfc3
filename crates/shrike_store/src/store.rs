//! The per-shard store: lifecycle plus the `StoreView` implementation.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shrike_btree::{BtreeSlice, Cache, Serializer};
use shrike_common::chunk::BackfillChunk;
use shrike_common::config::StoreConfig;
use shrike_common::order::OrderSource;
use shrike_common::query::{ReadQuery, ReadResponse, WriteQuery, WriteResponse};
use shrike_common::region::Region;
use shrike_common::{Cas, Interruptor, RegionMap, ShrikeResult, StateTimestamp};

use crate::acquire::{
    acquire_superblock_for_backfill, acquire_superblock_for_read, acquire_superblock_for_write,
};
use crate::backfill::{self, BackfillProgress, ChunkSink};
use crate::executor::{execute_read, execute_write};
use crate::fifo::{ReadToken, TokenFifo, WriteToken};
use crate::metainfo;
use crate::view::StoreView;

/// Expected change count for a single-key write plus its metainfo
/// overlay.
const WRITE_CHANGE_HINT: u64 = 2;

/// A single shard's storage adapter.
///
/// Exclusively owns, top to bottom: the tree slice, which owns the
/// cache, which owns the serializer; plus the order source and the FIFO
/// token pair. Dropping the store releases them in reverse order.
pub struct Store {
    slice: BtreeSlice,
    fifo: Arc<TokenFifo>,
    order_source: OrderSource,
    path: PathBuf,
}

impl Store {
    /// Open the store file, creating and formatting it first if asked.
    /// A fresh store's metainfo is a single `(universe, empty)` pair.
    pub fn open(path: &Path, create: bool, config: &StoreConfig) -> ShrikeResult<Store> {
        let cache = if create {
            let serializer = Serializer::create(path)?;
            Cache::create(serializer, config.cache.clone())?
        } else {
            let (serializer, snapshot) = Serializer::open(path)?;
            Cache::open(serializer, snapshot, config.cache.clone())?
        };
        let store = Store {
            slice: BtreeSlice::new(cache),
            fifo: TokenFifo::new(),
            order_source: OrderSource::new(),
            path: path.to_path_buf(),
        };
        if create {
            let mut txn = store.slice.begin_write(1)?;
            metainfo::write_metainfo(&mut txn, &RegionMap::universal(Bytes::new()));
            txn.commit()?;
            store.slice.flush()?;
        }
        tracing::info!(path = %store.path.display(), create, "store opened");
        Ok(store)
    }

    /// Flush deferred commits and release the store.
    pub fn close(self) -> ShrikeResult<()> {
        self.slice.flush()?;
        tracing::info!(path = %self.path.display(), "store closed");
        Ok(())
    }

    fn peek_slot_count(&self, region: &Region) -> u64 {
        // Sizing hint only; taken outside the token order on purpose.
        self.slice.begin_read().state().slot_count_in(region)
    }

    /// Maintenance: drop tombstones with recency at or below `up_to`.
    /// Raises the tombstone horizon, so backfills from older start
    /// points degrade to bulk resets.
    pub fn purge_tombstones(
        &self,
        up_to: StateTimestamp,
        token: WriteToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<u64> {
        let mut access = acquire_superblock_for_write(&self.slice, token, 1, interruptor)?;
        let purged = shrike_btree::ops::purge_tombstones(&mut access.txn, up_to);
        access.txn.commit()?;
        tracing::debug!(%up_to, purged, "purged tombstones");
        Ok(purged)
    }
}

impl StoreView for Store {
    fn new_read_token(&self) -> ReadToken {
        self.fifo
            .new_read_token(self.order_source.check_in("store::read"))
    }

    fn new_write_token(&self) -> WriteToken {
        self.fifo
            .new_write_token(self.order_source.check_in("store::write"))
    }

    fn get_metainfo(
        &self,
        token: ReadToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<RegionMap<Bytes>> {
        let access = acquire_superblock_for_read(&self.slice, token, interruptor)?;
        Ok(metainfo::decode_metainfo(access.txn.metainfo_pairs())?)
    }

    fn set_metainfo(
        &self,
        new: &RegionMap<Bytes>,
        token: WriteToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<()> {
        let mut access = acquire_superblock_for_write(&self.slice, token, 1, interruptor)?;
        let current = metainfo::decode_metainfo(access.txn.metainfo_pairs())?;
        metainfo::update_metainfo(&mut access.txn, &current, new)?;
        access.txn.commit()?;
        Ok(())
    }

    fn read(
        &self,
        expected_metainfo: &RegionMap<Bytes>,
        query: &ReadQuery,
        effective_time: u32,
        token: ReadToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<ReadResponse> {
        let access = acquire_superblock_for_read(&self.slice, token, interruptor)?;
        let current = metainfo::decode_metainfo(access.txn.metainfo_pairs())?;
        metainfo::check_metainfo(&current, expected_metainfo)?;
        Ok(execute_read(&access.txn, query, effective_time))
    }

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
    ) -> ShrikeResult<WriteResponse> {
        let mut access =
            acquire_superblock_for_write(&self.slice, token, WRITE_CHANGE_HINT, interruptor)?;
        metainfo::check_and_update_metainfo(&mut access.txn, expected_metainfo, new_metainfo)?;
        let response = execute_write(
            &mut access.txn,
            query,
            proposed_cas,
            effective_time,
            timestamp,
        );
        access.txn.commit()?;
        Ok(response)
    }

    fn send_backfill(
        &self,
        start_point: &RegionMap<StateTimestamp>,
        should_backfill: &mut dyn FnMut(&RegionMap<Bytes>) -> bool,
        sink: &mut dyn ChunkSink,
        progress: &BackfillProgress,
        token: ReadToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<bool> {
        let txn = acquire_superblock_for_backfill(&self.slice, token, interruptor)?;
        let current = metainfo::decode_metainfo(txn.metainfo_pairs())?;
        let masked = current.mask(&start_point.domain());
        if !should_backfill(&masked) {
            tracing::debug!(domain = %start_point.domain(), "backfill declined");
            return Ok(false);
        }
        backfill::produce(&txn, start_point, sink, progress, interruptor)?;
        tracing::debug!(domain = %start_point.domain(), "backfill traversal complete");
        Ok(true)
    }

    fn receive_backfill(
        &self,
        chunk: &BackfillChunk,
        token: WriteToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<()> {
        let hint = match chunk {
            BackfillChunk::DeleteRange { region } => self.peek_slot_count(region) + 1,
            other => backfill::chunk_change_hint(other),
        };
        let mut access = acquire_superblock_for_write(&self.slice, token, hint, interruptor)?;
        backfill::apply_chunk(&mut access.txn, chunk);
        access.txn.commit()?;
        Ok(())
    }

    fn reset_data(
        &self,
        subregion: &Region,
        new_metainfo: &RegionMap<Bytes>,
        token: WriteToken,
        interruptor: &Interruptor,
    ) -> ShrikeResult<()> {
        let hint = self.peek_slot_count(subregion) + 1;
        let mut access = acquire_superblock_for_write(&self.slice, token, hint, interruptor)?;
        let current = metainfo::decode_metainfo(access.txn.metainfo_pairs())?;
        metainfo::update_metainfo(&mut access.txn, &current, new_metainfo)?;
        let erased = shrike_btree::ops::erase_range(&mut access.txn, subregion);
        access.txn.commit()?;
        tracing::info!(%subregion, erased, "reset data");
        Ok(())
    }
}
