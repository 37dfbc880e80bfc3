//! The in-memory tree state: an ordered slot map plus the superblock
//! residue (metainfo pairs, cas source, tombstone horizon).

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;

use shrike_common::region::{Region, RightBound};
use shrike_common::{Cas, StateTimestamp, StoreKey};

/// A live value with its mutation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSlot {
    pub value: Bytes,
    pub flags: u32,
    pub exptime: u32,
    pub cas: Cas,
    pub recency: StateTimestamp,
}

impl LiveSlot {
    /// Expiration is evaluated lazily against the caller's effective
    /// time; zero exptime never expires.
    pub fn is_expired(&self, effective_time: u32) -> bool {
        self.exptime != 0 && u64::from(self.exptime) <= u64::from(effective_time)
    }
}

/// One key's slot: a live value or a deletion marker whose recency lets
/// backfill propagate the deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    Live(LiveSlot),
    Tombstone { recency: StateTimestamp },
}

impl Slot {
    pub fn recency(&self) -> StateTimestamp {
        match self {
            Slot::Live(live) => live.recency,
            Slot::Tombstone { recency } => *recency,
        }
    }

    pub fn as_live(&self) -> Option<&LiveSlot> {
        match self {
            Slot::Live(live) => Some(live),
            Slot::Tombstone { .. } => None,
        }
    }
}

/// The complete engine state published by a commit.
///
/// Cloning is the copy-on-write step a write transaction performs; the
/// published `Arc<TreeState>` is what read snapshots pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeState {
    pub(crate) slots: BTreeMap<StoreKey, Slot>,
    /// Superblock metainfo area: `(region_encoding, value_blob)` pairs in
    /// left-to-right write order. Opaque to the engine.
    pub(crate) metainfo: Vec<(Vec<u8>, Bytes)>,
    /// Monotone cas mint source, persisted so cas values never regress
    /// across restarts.
    pub(crate) next_cas: u64,
    /// Tombstones with recency at or below this may have been purged;
    /// incremental backfill from an older start point must bulk-reset.
    pub(crate) tombstone_horizon: StateTimestamp,
}

impl Default for TreeState {
    fn default() -> Self {
        TreeState {
            slots: BTreeMap::new(),
            metainfo: Vec::new(),
            next_cas: 1,
            tombstone_horizon: StateTimestamp::INVALID,
        }
    }
}

impl TreeState {
    pub fn new() -> TreeState {
        TreeState::default()
    }

    pub(crate) fn mint_cas(&mut self) -> Cas {
        let cas = Cas(self.next_cas);
        self.next_cas += 1;
        cas
    }

    pub fn tombstone_horizon(&self) -> StateTimestamp {
        self.tombstone_horizon
    }

    /// Range bounds over the slot map for a region.
    pub(crate) fn region_bounds(region: &Region) -> (Bound<StoreKey>, Bound<StoreKey>) {
        let left = Bound::Included(region.left().clone());
        let right = match region.right() {
            RightBound::Unbounded => Bound::Unbounded,
            RightBound::Key(k) => Bound::Excluded(k.clone()),
        };
        (left, right)
    }

    pub(crate) fn slots_in<'a>(
        &'a self,
        region: &Region,
    ) -> impl Iterator<Item = (&'a StoreKey, &'a Slot)> {
        self.slots.range(Self::region_bounds(region))
    }

    /// Total slots (live and tombstone) in a region.
    pub fn slot_count_in(&self, region: &Region) -> u64 {
        self.slots_in(region).count() as u64
    }

    /// Live slots in a region; sizes the change hint for bulk erases.
    pub fn live_count_in(&self, region: &Region) -> u64 {
        self.slots_in(region)
            .filter(|(_, slot)| slot.as_live().is_some())
            .count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> StoreKey {
        StoreKey::new(s).unwrap()
    }

    fn live(value: &str, recency: u64) -> Slot {
        Slot::Live(LiveSlot {
            value: Bytes::copy_from_slice(value.as_bytes()),
            flags: 0,
            exptime: 0,
            cas: Cas(1),
            recency: StateTimestamp(recency),
        })
    }

    #[test]
    fn test_zero_exptime_never_expires() {
        let slot = LiveSlot {
            value: Bytes::new(),
            flags: 0,
            exptime: 0,
            cas: Cas(1),
            recency: StateTimestamp(1),
        };
        assert!(!slot.is_expired(u32::MAX));
    }

    #[test]
    fn test_expiry_is_inclusive_of_deadline() {
        let slot = LiveSlot {
            value: Bytes::new(),
            flags: 0,
            exptime: 100,
            cas: Cas(1),
            recency: StateTimestamp(1),
        };
        assert!(!slot.is_expired(99));
        assert!(slot.is_expired(100));
        assert!(slot.is_expired(101));
    }

    #[test]
    fn test_cas_mint_is_monotone() {
        let mut state = TreeState::new();
        let a = state.mint_cas();
        let b = state.mint_cas();
        assert!(a.is_valid());
        assert!(b > a);
    }

    #[test]
    fn test_counts_in_region() {
        let mut state = TreeState::new();
        state.slots.insert(key("a"), live("1", 1));
        state.slots.insert(key("b"), live("2", 2));
        state.slots.insert(
            key("c"),
            Slot::Tombstone {
                recency: StateTimestamp(3),
            },
        );
        let all = Region::universe();
        assert_eq!(state.slot_count_in(&all), 3);
        assert_eq!(state.live_count_in(&all), 2);
        let bc = Region::new(key("b"), RightBound::Key(key("d"))).unwrap();
        assert_eq!(state.slot_count_in(&bc), 2);
        assert_eq!(state.live_count_in(&bc), 1);
    }
}
