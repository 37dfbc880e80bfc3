//! Scoped transactions over the tree slice.
//!
//! A read transaction pins the committed state; a write transaction
//! clones it, mutates privately, and publishes on `commit`. Dropping a
//! write transaction without committing aborts it: the working copy is
//! simply discarded. The superblock (metainfo area and cas source) is
//! part of the state, so superblock access follows the transaction's
//! access mode automatically.

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

use shrike_common::error::StoreError;

use crate::cache::Cache;
use crate::checkpoint::OrderCheckpoint;
use crate::tree::TreeState;

/// One store's slice of the key space: cache, order checkpoint, and the
/// writer-exclusion gate.
pub struct BtreeSlice {
    cache: Cache,
    checkpoint: OrderCheckpoint,
    write_excl: Mutex<()>,
}

impl BtreeSlice {
    pub fn new(cache: Cache) -> BtreeSlice {
        BtreeSlice {
            cache,
            checkpoint: OrderCheckpoint::new(),
            write_excl: Mutex::new(()),
        }
    }

    pub fn checkpoint(&self) -> &OrderCheckpoint {
        &self.checkpoint
    }

    /// Begin a shared-access transaction pinning the committed snapshot.
    pub fn begin_read(&self) -> ReadTransaction {
        ReadTransaction {
            state: self.cache.current(),
        }
    }

    /// Begin an exclusive-access transaction. The change-count hint
    /// pre-charges the cache's dirty budget.
    pub fn begin_write(&self, expected_change_count: u64) -> Result<WriteTransaction<'_>, StoreError> {
        let excl = self.write_excl.lock();
        self.cache.reserve_changes(expected_change_count)?;
        let working = (*self.cache.current()).clone();
        Ok(WriteTransaction {
            _excl: excl,
            cache: &self.cache,
            working,
            committed: false,
        })
    }

    /// Flush any deferred commits; called on store close.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.cache.flush()
    }
}

/// Shared-access transaction: an immutable pinned snapshot.
pub struct ReadTransaction {
    state: Arc<TreeState>,
}

impl ReadTransaction {
    pub fn state(&self) -> &Arc<TreeState> {
        &self.state
    }

    /// Superblock metainfo area, shared access.
    pub fn metainfo_pairs(&self) -> &[(Vec<u8>, Bytes)] {
        &self.state.metainfo
    }
}

/// Exclusive-access transaction over a private working copy.
pub struct WriteTransaction<'a> {
    _excl: MutexGuard<'a, ()>,
    cache: &'a Cache,
    pub(crate) working: TreeState,
    committed: bool,
}

impl WriteTransaction<'_> {
    pub fn state(&self) -> &TreeState {
        &self.working
    }

    pub(crate) fn state_mut(&mut self) -> &mut TreeState {
        &mut self.working
    }

    /// Superblock metainfo area, exclusive access.
    pub fn metainfo_pairs(&self) -> &[(Vec<u8>, Bytes)] {
        &self.working.metainfo
    }

    pub fn clear_metainfo(&mut self) {
        self.working.metainfo.clear();
    }

    pub fn push_metainfo_pair(&mut self, key_blob: Vec<u8>, value_blob: Bytes) {
        self.working.metainfo.push((key_blob, value_blob));
    }

    /// Publish the working copy as the committed state.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.committed = true;
        let working = std::mem::take(&mut self.working);
        self.cache.publish(working)
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!("write transaction dropped without commit; aborting");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::Serializer;
    use crate::tree::{LiveSlot, Slot};
    use shrike_common::config::CacheConfig;
    use shrike_common::{Cas, StateTimestamp, StoreKey};

    fn slice() -> (tempfile::TempDir, BtreeSlice) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.shrike");
        let serializer = Serializer::create(&path).unwrap();
        let cache = Cache::create(
            serializer,
            CacheConfig {
                max_size: 1 << 20,
                max_dirty_size: 0,
            },
        )
        .unwrap();
        (dir, BtreeSlice::new(cache))
    }

    fn put(txn: &mut WriteTransaction<'_>, key: &str, value: &str) {
        txn.state_mut().slots.insert(
            StoreKey::new(key).unwrap(),
            Slot::Live(LiveSlot {
                value: Bytes::copy_from_slice(value.as_bytes()),
                flags: 0,
                exptime: 0,
                cas: Cas(1),
                recency: StateTimestamp(1),
            }),
        );
    }

    #[test]
    fn test_commit_publishes() {
        let (_dir, slice) = slice();
        let mut txn = slice.begin_write(1).unwrap();
        put(&mut txn, "k", "v");
        txn.commit().unwrap();
        let read = slice.begin_read();
        assert!(read.state().slots.contains_key(&StoreKey::new("k").unwrap()));
    }

    #[test]
    fn test_drop_without_commit_aborts() {
        let (_dir, slice) = slice();
        {
            let mut txn = slice.begin_write(1).unwrap();
            put(&mut txn, "k", "v");
            // dropped here
        }
        let read = slice.begin_read();
        assert!(read.state().slots.is_empty());
    }

    #[test]
    fn test_snapshot_read_overlaps_write() {
        let (_dir, slice) = slice();
        let mut txn = slice.begin_write(1).unwrap();
        put(&mut txn, "k", "v");
        // A snapshot pinned before commit must not see the write.
        let before = slice.begin_read();
        txn.commit().unwrap();
        assert!(before.state().slots.is_empty());
        let after = slice.begin_read();
        assert_eq!(after.state().slots.len(), 1);
    }

    #[test]
    fn test_metainfo_area_scoped_to_txn() {
        let (_dir, slice) = slice();
        let mut txn = slice.begin_write(1).unwrap();
        txn.push_metainfo_pair(vec![1, 2], Bytes::from_static(b"blob"));
        txn.commit().unwrap();
        let read = slice.begin_read();
        assert_eq!(read.metainfo_pairs().len(), 1);
        assert_eq!(read.metainfo_pairs()[0].0, vec![1, 2]);
    }
}
