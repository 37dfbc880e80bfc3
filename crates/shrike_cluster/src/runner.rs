//! Replica catch-up: drain a source store's backfill stream into a
//! destination store through a bounded channel.
//!
//! The producer traverses on its own thread and blocks on the channel
//! when the consumer falls behind (backpressure). The consumer acquires
//! a write token per chunk, so regular writes on the destination
//! interleave fairly with the apply stream.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use shrike_common::chunk::BackfillChunk;
use shrike_common::{Interruptor, RegionMap, ShrikeResult, StateTimestamp};
use shrike_store::{BackfillProgress, Store, StoreView};

/// Chunks in flight before the producer blocks.
const CHANNEL_DEPTH: usize = 64;

/// Counters for one backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub chunks_applied: u64,
    pub set_keys: u64,
    pub delete_keys: u64,
    pub delete_ranges: u64,
    /// False when the source's `should_backfill` declined.
    pub completed: bool,
}

/// Stream every chunk the source produces for `start_point` into the
/// destination. Returns the applied-chunk counters; `completed` is false
/// if the source declined to backfill.
pub fn run_backfill(
    source: Arc<Store>,
    destination: &Store,
    start_point: RegionMap<StateTimestamp>,
    interruptor: &Interruptor,
) -> ShrikeResult<BackfillStats> {
    let (sender, receiver) = mpsc::sync_channel::<BackfillChunk>(CHANNEL_DEPTH);
    let progress = Arc::new(BackfillProgress::new());

    let producer = {
        let interruptor = interruptor.clone();
        let progress = progress.clone();
        thread::spawn(move || -> ShrikeResult<bool> {
            let mut sink = sender;
            let token = source.new_read_token();
            source.send_backfill(
                &start_point,
                &mut |_metainfo| true,
                &mut sink,
                &progress,
                token,
                &interruptor,
            )
        })
    };

    let mut stats = BackfillStats::default();
    let mut consumer_err = None;
    while let Ok(chunk) = receiver.recv() {
        match &chunk {
            BackfillChunk::SetKey { .. } => stats.set_keys += 1,
            BackfillChunk::DeleteKey { .. } => stats.delete_keys += 1,
            BackfillChunk::DeleteRange { .. } => stats.delete_ranges += 1,
        }
        let applied =
            destination.receive_backfill(&chunk, destination.new_write_token(), interruptor);
        if let Err(err) = applied {
            consumer_err = Some(err);
            break;
        }
        stats.chunks_applied += 1;
    }
    // Dropping the receiver makes the producer's next send fail, so it
    // unwinds promptly even when the consumer bailed out mid-stream.
    drop(receiver);
    let produced = producer
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
    if let Some(err) = consumer_err {
        return Err(err);
    }
    stats.completed = produced?;
    tracing::info!(
        chunks = stats.chunks_applied,
        completed = stats.completed,
        progress = progress.fraction(),
        "backfill run finished"
    );
    Ok(stats)
}
