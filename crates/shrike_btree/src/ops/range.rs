//! Range operations: lazy ascending reads, bulk erase, tombstone purge.

use bytes::Bytes;
use std::ops::Bound;
use std::sync::Arc;

use shrike_common::region::{Region, RightBound};
use shrike_common::{StateTimestamp, StoreKey};

use crate::transaction::{ReadTransaction, WriteTransaction};
use crate::tree::{Slot, TreeState};

/// Lazy single-pass ascending iterator over the live keys of a region.
///
/// Holds the read snapshot alive until exhausted or dropped. Tombstones
/// and expired slots are skipped.
pub struct RgetIter {
    state: Arc<TreeState>,
    cursor: Option<StoreKey>,
    right: RightBound,
    effective_time: u32,
}

impl Iterator for RgetIter {
    type Item = (StoreKey, Bytes);

    fn next(&mut self) -> Option<(StoreKey, Bytes)> {
        loop {
            let left = Bound::Included(self.cursor.clone()?);
            let right = match &self.right {
                RightBound::Unbounded => Bound::Unbounded,
                RightBound::Key(k) => Bound::Excluded(k.clone()),
            };
            let (key, slot) = self.state.slots.range((left, right)).next()?;
            let key = key.clone();
            self.cursor = Some(key.successor());
            if let Some(live) = slot.as_live() {
                if !live.is_expired(self.effective_time) {
                    return Some((key, live.value.clone()));
                }
            }
        }
    }
}

/// Begin a lazy range read over `region`, pinning the transaction's
/// snapshot.
pub fn rget(txn: &ReadTransaction, region: &Region, effective_time: u32) -> RgetIter {
    RgetIter {
        state: txn.state().clone(),
        cursor: (!region.is_empty()).then(|| region.left().clone()),
        right: region.right().clone(),
        effective_time,
    }
}

/// Remove every slot in `region`, live and tombstone alike, and raise the
/// tombstone horizon to the newest recency erased: the deletions this
/// range once recorded can no longer be enumerated.
pub fn erase_range(txn: &mut WriteTransaction<'_>, region: &Region) -> u64 {
    let state = txn.state_mut();
    let doomed: Vec<StoreKey> = state
        .slots_in(region)
        .map(|(key, _)| key.clone())
        .collect();
    let mut newest = StateTimestamp::INVALID;
    for key in &doomed {
        if let Some(slot) = state.slots.remove(key) {
            newest = newest.max(slot.recency());
        }
    }
    state.tombstone_horizon = state.tombstone_horizon.max(newest);
    doomed.len() as u64
}

/// Drop tombstones with recency at or below `up_to` and raise the
/// horizon accordingly. Maintenance entry point.
pub fn purge_tombstones(txn: &mut WriteTransaction<'_>, up_to: StateTimestamp) -> u64 {
    let state = txn.state_mut();
    let before = state.slots.len();
    state.slots.retain(|_, slot| match slot {
        Slot::Tombstone { recency } => *recency > up_to,
        Slot::Live(_) => true,
    });
    state.tombstone_horizon = state.tombstone_horizon.max(up_to);
    (before - state.slots.len()) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::ops::point::{set, SetArgs};
    use crate::serializer::Serializer;
    use crate::transaction::BtreeSlice;
    use shrike_common::config::CacheConfig;
    use shrike_common::query::{AddPolicy, ReplacePolicy};
    use shrike_common::Cas;

    fn slice() -> (tempfile::TempDir, BtreeSlice) {
        let dir = tempfile::tempdir().unwrap();
        let serializer = Serializer::create(&dir.path().join("s.shrike")).unwrap();
        let cache = Cache::create(
            serializer,
            CacheConfig {
                max_size: 1 << 20,
                max_dirty_size: 1 << 20,
            },
        )
        .unwrap();
        (dir, BtreeSlice::new(cache))
    }

    fn key(s: &str) -> StoreKey {
        StoreKey::new(s).unwrap()
    }

    fn region(l: &str, r: &str) -> Region {
        Region::new(key(l), RightBound::Key(key(r))).unwrap()
    }

    fn put(slice: &BtreeSlice, key_name: &str, value: &str, ts: u64) {
        let mut txn = slice.begin_write(1).unwrap();
        set(
            &mut txn,
            SetArgs {
                key: key(key_name),
                data: Bytes::copy_from_slice(value.as_bytes()),
                flags: 0,
                exptime: 0,
                add_policy: AddPolicy::Yes,
                replace_policy: ReplacePolicy::Yes,
                old_cas: Cas::INVALID,
                proposed_cas: Cas::INVALID,
                effective_time: 0,
                timestamp: StateTimestamp(ts),
            },
        );
        txn.commit().unwrap();
    }

    fn collect_keys(iter: RgetIter) -> Vec<String> {
        iter.map(|(k, _)| format!("{k}")).collect()
    }

    #[test]
    fn test_rget_ascending_with_bounds() {
        let (_dir, slice) = slice();
        for (k, v) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")] {
            put(&slice, k, v, 1);
        }
        let read = slice.begin_read();
        let iter = rget(&read, &region("a", "d"), 0);
        assert_eq!(collect_keys(iter), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rget_pins_snapshot() {
        let (_dir, slice) = slice();
        put(&slice, "a", "1", 1);
        let read = slice.begin_read();
        let iter = rget(&read, &Region::universe(), 0);
        drop(read);
        // Mutations after the snapshot are invisible to the iterator.
        put(&slice, "b", "2", 2);
        assert_eq!(collect_keys(iter), vec!["a"]);
    }

    #[test]
    fn test_rget_skips_tombstones_and_expired() {
        let (_dir, slice) = slice();
        put(&slice, "a", "1", 1);
        put(&slice, "b", "2", 2);
        {
            let mut txn = slice.begin_write(2).unwrap();
            crate::ops::point::delete(&mut txn, &key("a"), StateTimestamp(3));
            set(
                &mut txn,
                SetArgs {
                    key: key("c"),
                    data: Bytes::from_static(b"3"),
                    flags: 0,
                    exptime: 10,
                    add_policy: AddPolicy::Yes,
                    replace_policy: ReplacePolicy::Yes,
                    old_cas: Cas::INVALID,
                    proposed_cas: Cas::INVALID,
                    effective_time: 0,
                    timestamp: StateTimestamp(4),
                },
            );
            txn.commit().unwrap();
        }
        let read = slice.begin_read();
        let iter = rget(&read, &Region::universe(), 100);
        assert_eq!(collect_keys(iter), vec!["b"]);
    }

    #[test]
    fn test_erase_range_raises_horizon() {
        let (_dir, slice) = slice();
        put(&slice, "a", "1", 5);
        put(&slice, "b", "2", 9);
        put(&slice, "x", "3", 2);
        let mut txn = slice.begin_write(2).unwrap();
        let erased = erase_range(&mut txn, &region("a", "c"));
        assert_eq!(erased, 2);
        assert_eq!(txn.state().tombstone_horizon(), StateTimestamp(9));
        txn.commit().unwrap();
        let read = slice.begin_read();
        assert_eq!(read.state().slots.len(), 1);
    }

    #[test]
    fn test_purge_tombstones() {
        let (_dir, slice) = slice();
        put(&slice, "a", "1", 1);
        put(&slice, "b", "2", 2);
        {
            let mut txn = slice.begin_write(2).unwrap();
            crate::ops::point::delete(&mut txn, &key("a"), StateTimestamp(3));
            crate::ops::point::delete(&mut txn, &key("b"), StateTimestamp(8));
            txn.commit().unwrap();
        }
        let mut txn = slice.begin_write(1).unwrap();
        assert_eq!(purge_tombstones(&mut txn, StateTimestamp(5)), 1);
        assert_eq!(txn.state().tombstone_horizon(), StateTimestamp(5));
        txn.commit().unwrap();
        let read = slice.begin_read();
        assert!(read.state().slots.contains_key(&key("b")));
        assert!(!read.state().slots.contains_key(&key("a")));
    }

    #[test]
    fn test_rget_empty_region_yields_nothing() {
        let (_dir, slice) = slice();
        put(&slice, "a", "1", 1);
        let read = slice.begin_read();
        let iter = rget(&read, &region("c", "c"), 0);
        assert_eq!(collect_keys(iter), Vec::<String>::new());
    }
}
