//! The state cache: owns the serializer, holds the committed tree state,
//! and budgets dirty bytes between flushes.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use shrike_common::config::CacheConfig;
use shrike_common::error::{CodecError, StoreError};

use crate::serializer::Serializer;
use crate::tree::TreeState;

/// Approximate dirty bytes charged per expected change; one page per
/// touched key.
const APPROX_CHANGE_BYTES: u64 = 4096;

pub struct Cache {
    serializer: Serializer,
    config: CacheConfig,
    current: RwLock<Arc<TreeState>>,
    dirty_bytes: AtomicU64,
}

impl Cache {
    /// Wrap a freshly formatted serializer around an empty state and
    /// persist it, so `open` after a crash-free `create` always finds a
    /// snapshot.
    pub fn create(serializer: Serializer, config: CacheConfig) -> Result<Cache, StoreError> {
        let cache = Cache {
            serializer,
            config,
            current: RwLock::new(Arc::new(TreeState::new())),
            dirty_bytes: AtomicU64::new(0),
        };
        cache.flush()?;
        Ok(cache)
    }

    /// Adopt the last snapshot an existing serializer replayed.
    pub fn open(
        serializer: Serializer,
        snapshot: Option<Vec<u8>>,
        config: CacheConfig,
    ) -> Result<Cache, StoreError> {
        let state = match snapshot {
            Some(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| StoreError::Corruption(CodecError::Snapshot(e.to_string())))?,
            None => TreeState::new(),
        };
        tracing::debug!(
            max_size = config.max_size,
            max_dirty_size = config.max_dirty_size,
            "cache adopted snapshot"
        );
        Ok(Cache {
            serializer,
            config,
            current: RwLock::new(Arc::new(state)),
            dirty_bytes: AtomicU64::new(0),
        })
    }

    /// The committed state; cloning the `Arc` pins a consistent snapshot.
    pub fn current(&self) -> Arc<TreeState> {
        self.current.read().clone()
    }

    /// Pre-charge the dirty budget with a transaction's expected change
    /// count; flushes first if the budget would overflow.
    pub fn reserve_changes(&self, expected_change_count: u64) -> Result<(), StoreError> {
        let projected = self
            .dirty_bytes
            .load(Ordering::Relaxed)
            .saturating_add(expected_change_count.saturating_mul(APPROX_CHANGE_BYTES));
        if projected > self.config.max_dirty_size {
            self.flush()?;
        }
        self.dirty_bytes
            .fetch_add(expected_change_count.saturating_mul(APPROX_CHANGE_BYTES), Ordering::Relaxed);
        Ok(())
    }

    /// Publish a committed state. Flushes inline when the dirty budget is
    /// exhausted; otherwise durability is deferred to the next flush.
    pub fn publish(&self, state: TreeState) -> Result<(), StoreError> {
        *self.current.write() = Arc::new(state);
        if self.dirty_bytes.load(Ordering::Relaxed) >= self.config.max_dirty_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Serialize the committed state through the serializer and reset the
    /// dirty budget.
    pub fn flush(&self) -> Result<(), StoreError> {
        let state = self.current();
        let payload = bincode::serialize(&*state)
            .map_err(|e| StoreError::Corruption(CodecError::Snapshot(e.to_string())))?;
        self.serializer.commit_snapshot(&payload)?;
        self.dirty_bytes.store(0, Ordering::Relaxed);
        Ok(())
    }
}
