//! Backfill plumbing: the chunk sink, per-traversal progress, and the
//! producer/consumer helpers the store wires into its view methods.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use shrike_btree::{ops, ReadTransaction, WriteTransaction};
use shrike_common::chunk::BackfillChunk;
use shrike_common::error::StoreError;
use shrike_common::query::{AddPolicy, ReplacePolicy};
use shrike_common::{Cas, Interruptor, RegionMap, StateTimestamp};

/// Destination for produced chunks. Sends may block (backpressure); a
/// receiver that has gone away surfaces as `Interrupted`, which unwinds
/// the traversal like any other cancellation.
pub trait ChunkSink: Send {
    fn send(&mut self, chunk: BackfillChunk) -> Result<(), StoreError>;
}

impl ChunkSink for std::sync::mpsc::SyncSender<BackfillChunk> {
    fn send(&mut self, chunk: BackfillChunk) -> Result<(), StoreError> {
        std::sync::mpsc::SyncSender::send(self, chunk).map_err(|_| StoreError::Interrupted)
    }
}

impl ChunkSink for Vec<BackfillChunk> {
    fn send(&mut self, chunk: BackfillChunk) -> Result<(), StoreError> {
        self.push(chunk);
        Ok(())
    }
}

/// Progress of one per-region traversal.
#[derive(Debug)]
pub struct TraversalProgress {
    visited: AtomicU64,
    total: AtomicU64,
}

impl TraversalProgress {
    pub fn new(total: u64) -> Arc<TraversalProgress> {
        Arc::new(TraversalProgress {
            visited: AtomicU64::new(0),
            total: AtomicU64::new(total),
        })
    }

    pub fn tick(&self) {
        self.visited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fraction(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        let visited = self.visited.load(Ordering::Relaxed).min(total);
        visited as f64 / total as f64
    }
}

/// Aggregate over every registered traversal; reports overall fraction
/// complete.
#[derive(Debug, Default)]
pub struct BackfillProgress {
    parts: Mutex<Vec<Arc<TraversalProgress>>>,
}

impl BackfillProgress {
    pub fn new() -> BackfillProgress {
        BackfillProgress::default()
    }

    pub fn register(&self, part: Arc<TraversalProgress>) {
        self.parts.lock().push(part);
    }

    /// Mean of the constituent fractions; 0.0 before anything registers.
    pub fn fraction(&self) -> f64 {
        let parts = self.parts.lock();
        if parts.is_empty() {
            return 0.0;
        }
        parts.iter().map(|p| p.fraction()).sum::<f64>() / parts.len() as f64
    }
}

/// Walk every `(region, since_when)` entry of the start point in
/// left-to-right order, emitting chunks through the sink.
pub fn produce(
    txn: &ReadTransaction,
    start_point: &RegionMap<StateTimestamp>,
    sink: &mut dyn ChunkSink,
    progress: &BackfillProgress,
    interruptor: &Interruptor,
) -> Result<(), StoreError> {
    for (region, since_when) in start_point.iter() {
        let part = TraversalProgress::new(txn.state().slot_count_in(region));
        progress.register(part.clone());
        ops::backfill_traverse(
            txn,
            region,
            *since_when,
            &mut |chunk| {
                interruptor.check()?;
                sink.send(chunk)
            },
            &mut || part.tick(),
        )?;
    }
    Ok(())
}

/// Apply one received chunk. Replay is idempotent: set-key stamps the
/// atom's cas and recency verbatim, delete-key applies the chunk's
/// recency as the tombstone timestamp, delete-range erases wholesale.
pub fn apply_chunk(txn: &mut WriteTransaction<'_>, chunk: &BackfillChunk) {
    match chunk {
        BackfillChunk::DeleteRange { region } => {
            let erased = ops::erase_range(txn, region);
            tracing::debug!(%region, erased, "backfill reset erased range");
        }
        BackfillChunk::DeleteKey { key, recency } => {
            ops::delete(txn, key, *recency);
        }
        BackfillChunk::SetKey { atom } => {
            ops::set(
                txn,
                ops::SetArgs {
                    key: atom.key.clone(),
                    data: atom.value.clone(),
                    flags: atom.flags,
                    exptime: atom.exptime,
                    add_policy: AddPolicy::Yes,
                    replace_policy: ReplacePolicy::Yes,
                    old_cas: Cas::INVALID,
                    proposed_cas: atom.cas_or_zero,
                    effective_time: 0,
                    timestamp: atom.recency,
                },
            );
        }
    }
}

/// Change-count hint for applying one chunk.
pub fn chunk_change_hint(chunk: &BackfillChunk) -> u64 {
    match chunk {
        // The erase fans out; the store refines this with a live count
        // once the transaction is open.
        BackfillChunk::DeleteRange { .. } => 2,
        BackfillChunk::DeleteKey { .. } | BackfillChunk::SetKey { .. } => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let part = TraversalProgress::new(4);
        assert_eq!(part.fraction(), 0.0);
        part.tick();
        part.tick();
        assert_eq!(part.fraction(), 0.5);
        part.tick();
        part.tick();
        assert_eq!(part.fraction(), 1.0);
    }

    #[test]
    fn test_empty_traversal_reports_complete() {
        let part = TraversalProgress::new(0);
        assert_eq!(part.fraction(), 1.0);
    }

    #[test]
    fn test_aggregate_progress() {
        let progress = BackfillProgress::new();
        assert_eq!(progress.fraction(), 0.0);
        let a = TraversalProgress::new(2);
        let b = TraversalProgress::new(0);
        progress.register(a.clone());
        progress.register(b);
        // a: 0.0, b: 1.0
        assert_eq!(progress.fraction(), 0.5);
        a.tick();
        a.tick();
        assert_eq!(progress.fraction(), 1.0);
    }
}
