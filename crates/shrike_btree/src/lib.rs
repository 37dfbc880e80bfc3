//! The transactional ordered KV engine backing each shrikedb store.
//!
//! Ownership is strictly layered: the cache exclusively owns the
//! serializer handle, the tree slice exclusively owns the cache, and the
//! store (one level up) exclusively owns the slice. Releasing happens in
//! reverse order on drop.
//!
//! Readers pin an immutable copy-on-write snapshot; a write transaction
//! works on a private clone and publishes atomically on commit, so
//! snapshot reads may overlap a writer.

pub mod cache;
pub mod checkpoint;
pub mod ops;
pub mod serializer;
pub mod transaction;
pub mod tree;

pub use cache::Cache;
pub use checkpoint::OrderCheckpoint;
pub use serializer::Serializer;
pub use transaction::{BtreeSlice, ReadTransaction, WriteTransaction};
pub use tree::{LiveSlot, Slot, TreeState};
