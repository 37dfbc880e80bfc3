use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic per-key version used for optimistic concurrency on writes.
///
/// `Cas::INVALID` (zero) doubles as "no cas": as an expected value it means
/// "do not check", as a proposed value it means "mint a fresh one".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Cas(pub u64);

impl Cas {
    pub const INVALID: Cas = Cas(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Cas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cas:{}", self.0)
    }
}

/// Logical timestamp stamped on every mutation.
///
/// Derived from the cluster transition and monotone per region; backfill
/// recency values are of this type. `INVALID` (zero) marks mutations
/// applied outside any transition, e.g. backfill replay.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct StateTimestamp(pub u64);

impl StateTimestamp {
    pub const INVALID: StateTimestamp = StateTimestamp(0);
    pub const MIN: StateTimestamp = StateTimestamp(0);
    pub const MAX: StateTimestamp = StateTimestamp(u64::MAX);

    pub fn next(self) -> StateTimestamp {
        StateTimestamp(self.0 + 1)
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for StateTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts:{}", self.0)
    }
}
