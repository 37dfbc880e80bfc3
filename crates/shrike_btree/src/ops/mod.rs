//! Engine operations, dispatched by the storage adapter's executors.
//!
//! Point operations take the write transaction's working state; range
//! reads pin the read transaction's snapshot and stay lazy.

mod backfill;
mod point;
mod range;

pub use backfill::backfill_traverse;
pub use point::{append_prepend, delete, get, get_cas, incr_decr, set, SetArgs};
pub use range::{erase_range, purge_tombstones, rget, RgetIter};
