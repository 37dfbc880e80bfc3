//! Region algebra: intervals in the total key order.
//!
//! The canonical internal form is left-closed, right-open (or
//! right-unbounded). External bound modes — open, closed, or none on
//! either side — normalize into this form on construction:
//! an open left bound becomes the successor key, a closed right bound
//! becomes the successor key, and `none` becomes the minimum key or the
//! unbounded right. `[k, k]` closed-closed is therefore `[k, succ(k))`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::RoutingError;
use crate::key::StoreKey;

/// How one side of an externally-phrased range is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundMode {
    /// Unbounded on this side.
    None,
    /// Bounded, excluding the named key.
    Open,
    /// Bounded, including the named key.
    Closed,
}

/// The exclusive right edge of a region.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RightBound {
    Key(StoreKey),
    Unbounded,
}

impl RightBound {
    pub fn is_unbounded(&self) -> bool {
        matches!(self, RightBound::Unbounded)
    }

    pub fn key(&self) -> Option<&StoreKey> {
        match self {
            RightBound::Key(k) => Some(k),
            RightBound::Unbounded => None,
        }
    }
}

impl PartialOrd for RightBound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RightBound {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (RightBound::Unbounded, RightBound::Unbounded) => Ordering::Equal,
            (RightBound::Unbounded, RightBound::Key(_)) => Ordering::Greater,
            (RightBound::Key(_), RightBound::Unbounded) => Ordering::Less,
            (RightBound::Key(a), RightBound::Key(b)) => a.cmp(b),
        }
    }
}

impl fmt::Debug for RightBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RightBound::Key(k) => write!(f, "{k:?}"),
            RightBound::Unbounded => write!(f, "+inf"),
        }
    }
}

/// A half-open interval `[left, right)` in the total key order, with the
/// right edge optionally unbounded.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    left: StoreKey,
    right: RightBound,
}

impl Region {
    /// The region covering every key.
    pub fn universe() -> Region {
        Region {
            left: StoreKey::min(),
            right: RightBound::Unbounded,
        }
    }

    /// Construct from canonical bounds. Fails unless `left <= right`.
    pub fn new(left: StoreKey, right: RightBound) -> Result<Region, RoutingError> {
        if let RightBound::Key(r) = &right {
            if &left > r {
                return Err(RoutingError::InvariantViolated(format!(
                    "region left bound {left} exceeds right bound {r}"
                )));
            }
        }
        Ok(Region { left, right })
    }

    /// The region containing exactly `key`: `[key, succ(key))`.
    pub fn point(key: &StoreKey) -> Region {
        Region {
            left: key.clone(),
            right: RightBound::Key(key.successor()),
        }
    }

    /// Normalize externally-phrased bound modes into the canonical form.
    ///
    /// `left_key`/`right_key` are ignored when the corresponding mode is
    /// `None`.
    pub fn from_bounds(
        left_mode: BoundMode,
        left_key: &StoreKey,
        right_mode: BoundMode,
        right_key: &StoreKey,
    ) -> Result<Region, RoutingError> {
        let left = match left_mode {
            BoundMode::None => StoreKey::min(),
            BoundMode::Closed => left_key.clone(),
            BoundMode::Open => left_key.successor(),
        };
        let right = match right_mode {
            BoundMode::None => RightBound::Unbounded,
            BoundMode::Open => RightBound::Key(right_key.clone()),
            BoundMode::Closed => RightBound::Key(right_key.successor()),
        };
        Region::new(left, right)
    }

    pub fn left(&self) -> &StoreKey {
        &self.left
    }

    pub fn right(&self) -> &RightBound {
        &self.right
    }

    /// True when no key is contained.
    pub fn is_empty(&self) -> bool {
        match &self.right {
            RightBound::Unbounded => false,
            RightBound::Key(r) => &self.left >= r,
        }
    }

    pub fn contains_key(&self, key: &StoreKey) -> bool {
        if key < &self.left {
            return false;
        }
        match &self.right {
            RightBound::Unbounded => true,
            RightBound::Key(r) => key < r,
        }
    }

    /// True iff every key in `other` lies in `self`.
    pub fn is_superset(&self, other: &Region) -> bool {
        if other.is_empty() {
            return true;
        }
        self.left <= other.left && self.right >= other.right
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        !self.intersection(other).is_empty()
    }

    /// The common sub-region; empty when the regions are disjoint.
    pub fn intersection(&self, other: &Region) -> Region {
        let left = self.left.clone().max(other.left.clone());
        let right = std::cmp::min(self.right.clone(), other.right.clone());
        let right = match right {
            // Clamp so the result stays a well-formed (possibly empty) region.
            RightBound::Key(r) if r < left => RightBound::Key(left.clone()),
            other => other,
        };
        Region { left, right }
    }
}

impl PartialOrd for Region {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Region {
    fn cmp(&self, other: &Self) -> Ordering {
        self.left
            .cmp(&other.left)
            .then_with(|| self.right.cmp(&other.right))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.right {
            RightBound::Key(r) => write!(f, "[{}, {})", self.left, r),
            RightBound::Unbounded => write!(f, "[{}, +inf)", self.left),
        }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Region({self})")
    }
}
