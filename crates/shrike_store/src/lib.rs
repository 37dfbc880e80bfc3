//! The per-shard storage adapter.
//!
//! Fronts one [`shrike_btree`] slice with the memcached-style
//! query/mutation surface the cluster layer consumes: FIFO-ordered
//! read/write admission, superblock acquisition, metainfo bookkeeping,
//! query executors, and the backfill producer/consumer.

pub mod acquire;
pub mod backfill;
pub mod executor;
pub mod fifo;
pub mod metainfo;
pub mod store;
pub mod view;

pub use backfill::{BackfillProgress, ChunkSink, TraversalProgress};
pub use fifo::{ReadToken, TokenFifo, WriteToken};
pub use store::Store;
pub use view::StoreView;
