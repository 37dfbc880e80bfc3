//! Superblock acquisition: await FIFO admission, stamp the order token
//! through the engine's checkpoint, and open the transaction. The
//! returned access bundles the transaction with its admission so that
//! every exit path releases both, in order.

use shrike_btree::{BtreeSlice, ReadTransaction, WriteTransaction};
use shrike_common::error::StoreError;
use shrike_common::Interruptor;

use crate::fifo::{AdmissionGuard, ReadToken, WriteToken};

/// Shared access: pinned snapshot plus the held ticket.
pub struct ReadAccess {
    pub txn: ReadTransaction,
    _admission: AdmissionGuard,
}

/// Exclusive access: working state plus the held ticket.
pub struct WriteAccess<'s> {
    pub txn: WriteTransaction<'s>,
    _admission: AdmissionGuard,
}

/// Acquire the superblock for a read. Every read in this engine is a
/// consistent snapshot read: the pinned state cannot observe later
/// mutations.
pub fn acquire_superblock_for_read(
    slice: &BtreeSlice,
    token: ReadToken,
    interruptor: &Interruptor,
) -> Result<ReadAccess, StoreError> {
    let order = token.order_token();
    let admission = token.await_admission(interruptor)?;
    slice.checkpoint().check_read(order);
    interruptor.check()?;
    Ok(ReadAccess {
        txn: slice.begin_read(),
        _admission: admission,
    })
}

/// Acquire for backfill: shared admission, but the ticket is released as
/// soon as the snapshot is pinned so the (long) traversal never holds up
/// later tickets.
pub fn acquire_superblock_for_backfill(
    slice: &BtreeSlice,
    token: ReadToken,
    interruptor: &Interruptor,
) -> Result<ReadTransaction, StoreError> {
    let order = token.order_token();
    let admission = token.await_admission(interruptor)?;
    slice.checkpoint().check_read(order);
    interruptor.check()?;
    let txn = slice.begin_read();
    drop(admission);
    Ok(txn)
}

/// Acquire the superblock for a write. `expected_change_count` is
/// forwarded to the cache for dirty-page budgeting.
pub fn acquire_superblock_for_write<'s>(
    slice: &'s BtreeSlice,
    token: WriteToken,
    expected_change_count: u64,
    interruptor: &Interruptor,
) -> Result<WriteAccess<'s>, StoreError> {
    let order = token.order_token();
    let admission = token.await_admission(interruptor)?;
    slice.checkpoint().check_write(order);
    interruptor.check()?;
    Ok(WriteAccess {
        txn: slice.begin_write(expected_change_count)?,
        _admission: admission,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shrike_btree::Cache;
    use shrike_btree::Serializer;
    use shrike_common::config::CacheConfig;
    use shrike_common::order::OrderSource;
    use shrike_common::OrderToken;

    use crate::fifo::TokenFifo;

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

    #[test]
    fn test_read_acquisition_binds_txn_and_ticket() {
        let (_dir, slice) = slice();
        let fifo = TokenFifo::new();
        let source = OrderSource::new();
        let token = fifo.new_read_token(source.check_in("test::read"));
        let access = acquire_superblock_for_read(&slice, token, &Interruptor::new()).unwrap();
        assert!(access.txn.metainfo_pairs().is_empty());
        drop(access);
        // Ticket exited: a write can now be admitted immediately.
        let write = fifo.new_write_token(source.check_in("test::write"));
        let waccess =
            acquire_superblock_for_write(&slice, write, 1, &Interruptor::new()).unwrap();
        drop(waccess);
    }

    #[test]
    fn test_interrupted_before_admission() {
        let (_dir, slice) = slice();
        let fifo = TokenFifo::new();
        let int = Interruptor::new();
        int.fire();
        let token = fifo.new_read_token(OrderToken::IGNORE);
        let result = acquire_superblock_for_read(&slice, token, &int);
        assert!(matches!(result, Err(StoreError::Interrupted)));
    }

    #[test]
    fn test_backfill_acquisition_releases_ticket_early() {
        let (_dir, slice) = slice();
        let fifo = TokenFifo::new();
        let source = OrderSource::new();
        let token = fifo.new_read_token(source.check_in("test::backfill"));
        let txn = acquire_superblock_for_backfill(&slice, token, &Interruptor::new()).unwrap();
        // The ticket already exited even though the snapshot is held: a
        // write admits while the traversal would still be running.
        let write = fifo.new_write_token(source.check_in("test::write"));
        let waccess =
            acquire_superblock_for_write(&slice, write, 1, &Interruptor::new()).unwrap();
        drop(waccess);
        drop(txn);
    }
}
