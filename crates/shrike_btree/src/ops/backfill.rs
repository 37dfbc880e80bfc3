//! Backfill traversal: walk a region and emit the chunks that bring a
//! replica from `since_when` up to this snapshot.

use shrike_common::chunk::{BackfillAtom, BackfillChunk};
use shrike_common::error::StoreError;
use shrike_common::region::Region;
use shrike_common::StateTimestamp;

use crate::transaction::ReadTransaction;
use crate::tree::Slot;

/// Walk `region` in ascending key order.
///
/// Incremental mode emits `delete_key` for tombstones and `set_key` for
/// live slots with recency newer than `since_when`. When `since_when`
/// predates the tombstone horizon the walk cannot enumerate deletions any
/// more, so it degrades to a bulk reset: one `delete_range` for the whole
/// region followed by `set_key` for every live slot.
///
/// `visited` ticks once per slot examined, for progress accounting.
pub fn backfill_traverse(
    txn: &ReadTransaction,
    region: &Region,
    since_when: StateTimestamp,
    emit: &mut dyn FnMut(BackfillChunk) -> Result<(), StoreError>,
    visited: &mut dyn FnMut(),
) -> Result<(), StoreError> {
    let state = txn.state();
    let bulk_reset = since_when < state.tombstone_horizon();
    if bulk_reset {
        tracing::debug!(
            %region,
            %since_when,
            horizon = %state.tombstone_horizon(),
            "start point predates tombstone horizon; emitting bulk reset"
        );
        emit(BackfillChunk::DeleteRange {
            region: region.clone(),
        })?;
    }
    for (key, slot) in state.slots_in(region) {
        visited();
        match slot {
            Slot::Live(live) => {
                if bulk_reset || live.recency > since_when {
                    emit(BackfillChunk::SetKey {
                        atom: BackfillAtom {
                            key: key.clone(),
                            value: live.value.clone(),
                            flags: live.flags,
                            exptime: live.exptime,
                            cas_or_zero: live.cas,
                            recency: live.recency,
                        },
                    })?;
                }
            }
            Slot::Tombstone { recency } => {
                if !bulk_reset && *recency > since_when {
                    emit(BackfillChunk::DeleteKey {
                        key: key.clone(),
                        recency: *recency,
                    })?;
                }
            }
        }
    }
    Ok(())
}
