//! A total map from disjoint regions to values.
//!
//! The entries partition the map's domain exactly: no gaps, no overlaps,
//! kept in left-to-right order. Metainfo is a `RegionMap<Bytes>` whose
//! domain is always the universe; backfill start points are
//! `RegionMap<StateTimestamp>` over the subregion of interest.

use std::fmt;

use crate::error::RoutingError;
use crate::key::StoreKey;
use crate::region::{Region, RightBound};

#[derive(Clone)]
pub struct RegionMap<V> {
    /// Ascending by left edge; adjacent entries share a boundary key.
    entries: Vec<(Region, V)>,
}

impl<V> RegionMap<V> {
    /// A map with a single entry covering every key.
    pub fn universal(value: V) -> RegionMap<V> {
        RegionMap {
            entries: vec![(Region::universe(), value)],
        }
    }

    /// Build from entries, validating the partition invariant.
    pub fn from_entries(mut entries: Vec<(Region, V)>) -> Result<RegionMap<V>, RoutingError> {
        if entries.iter().any(|(r, _)| r.is_empty()) {
            return Err(RoutingError::InvariantViolated(
                "region map entry with empty region".into(),
            ));
        }
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        for pair in entries.windows(2) {
            let (a, _) = &pair[0];
            let (b, _) = &pair[1];
            match a.right() {
                RightBound::Unbounded => {
                    return Err(RoutingError::InvariantViolated(format!(
                        "region {a} is unbounded but {b} follows it"
                    )));
                }
                RightBound::Key(r) if r != b.left() => {
                    return Err(RoutingError::InvariantViolated(format!(
                        "regions {a} and {b} leave a gap or overlap"
                    )));
                }
                RightBound::Key(_) => {}
            }
        }
        Ok(RegionMap { entries })
    }

    /// The contiguous region this map covers. Empty maps (which only arise
    /// from masking with a disjoint region) report an empty domain.
    pub fn domain(&self) -> Region {
        match (self.entries.first(), self.entries.last()) {
            (Some((first, _)), Some((last, _))) => {
                Region::new(first.left().clone(), last.right().clone())
                    .expect("partition invariant implies left <= right")
            }
            _ => Region::new(StoreKey::min(), RightBound::Key(StoreKey::min()))
                .expect("empty region at the minimum key"),
        }
    }

    /// The value governing `key`, or `None` outside the domain.
    pub fn lookup(&self, key: &StoreKey) -> Option<&V> {
        let idx = self.entries.partition_point(|(r, _)| r.left() <= key);
        idx.checked_sub(1).and_then(|i| {
            let (region, value) = &self.entries[i];
            region.contains_key(key).then_some(value)
        })
    }

    /// Left-to-right iteration over the partition.
    pub fn iter(&self) -> impl Iterator<Item = (&Region, &V)> {
        self.entries.iter().map(|(r, v)| (r, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> RegionMap<V> {
    /// Restrict to `region`, splitting boundary entries.
    pub fn mask(&self, region: &Region) -> RegionMap<V> {
        let entries = self
            .entries
            .iter()
            .filter_map(|(r, v)| {
                let piece = r.intersection(region);
                (!piece.is_empty()).then(|| (piece, v.clone()))
            })
            .collect();
        RegionMap { entries }
    }

    /// Overlay `other` onto `self`, splitting entries as needed to keep
    /// the partition invariant. Fails unless `other`'s domain lies within
    /// `self`'s.
    pub fn update(&self, other: &RegionMap<V>) -> Result<RegionMap<V>, RoutingError> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        let overlay = other.domain();
        if !self.domain().is_superset(&overlay) {
            return Err(RoutingError::InvariantViolated(format!(
                "update domain {overlay} escapes map domain {}",
                self.domain()
            )));
        }
        let mut entries: Vec<(Region, V)> = Vec::with_capacity(self.entries.len() + other.len());
        for (region, value) in &self.entries {
            for piece in subtract(region, &overlay) {
                entries.push((piece, value.clone()));
            }
        }
        entries.extend(other.entries.iter().cloned());
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        let updated = RegionMap { entries };
        debug_assert_eq!(updated.domain(), self.domain());
        Ok(updated)
    }
}

/// `a` minus `b`: at most one piece on each side of `b`.
fn subtract(a: &Region, b: &Region) -> Vec<Region> {
    let mut pieces = Vec::new();
    if a.left() < b.left() {
        let right = std::cmp::min(a.right().clone(), RightBound::Key(b.left().clone()));
        if let Ok(piece) = Region::new(a.left().clone(), right) {
            if !piece.is_empty() {
                pieces.push(piece);
            }
        }
    }
    if let RightBound::Key(b_right) = b.right() {
        let left = std::cmp::max(a.left(), b_right).clone();
        if let Ok(piece) = Region::new(left, a.right().clone()) {
            if !piece.is_empty() {
                pieces.push(piece);
            }
        }
    }
    pieces
}

/// Semantic equality: two maps agree when they cover the same domain and
/// assign the same value to every key, regardless of how the partition is
/// split.
impl<V: PartialEq> PartialEq for RegionMap<V> {
    fn eq(&self, other: &Self) -> bool {
        if self.domain() != other.domain() {
            return false;
        }
        self.entries
            .iter()
            .chain(other.entries.iter())
            .map(|(r, _)| r.left())
            .all(|edge| self.lookup(edge) == other.lookup(edge))
    }
}

impl<V: PartialEq> Eq for RegionMap<V> {}

impl<V: fmt::Debug> fmt::Debug for RegionMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(r, v)| (format!("{r}"), v)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> StoreKey {
        StoreKey::new(s).unwrap()
    }

    fn region(l: &str, r: &str) -> Region {
        Region::new(key(l), RightBound::Key(key(r))).unwrap()
    }

    fn tail(l: &str) -> Region {
        Region::new(key(l), RightBound::Unbounded).unwrap()
    }

    #[test]
    fn test_universal_covers_universe() {
        let m = RegionMap::universal(7u32);
        assert_eq!(m.domain(), Region::universe());
        assert_eq!(m.lookup(&key("anything")), Some(&7));
    }

    #[test]
    fn test_partition_validation_rejects_gap() {
        let err = RegionMap::from_entries(vec![(region("", "b"), 1), (region("c", "z"), 2)]);
        assert!(err.is_err());
    }

    #[test]
    fn test_partition_validation_rejects_overlap() {
        let err = RegionMap::from_entries(vec![(region("", "c"), 1), (region("b", "z"), 2)]);
        assert!(err.is_err());
    }

    #[test]
    fn test_lookup_respects_boundaries() {
        let m =
            RegionMap::from_entries(vec![(region("", "m"), 1), (tail("m"), 2)]).unwrap();
        assert_eq!(m.lookup(&key("a")), Some(&1));
        assert_eq!(m.lookup(&key("m")), Some(&2));
        assert_eq!(m.lookup(&key("z")), Some(&2));
    }

    #[test]
    fn test_mask_splits_boundary_entries() {
        let m = RegionMap::universal(1u32);
        let masked = m.mask(&region("c", "f"));
        assert_eq!(masked.domain(), region("c", "f"));
        assert_eq!(masked.lookup(&key("d")), Some(&1));
        assert_eq!(masked.lookup(&key("g")), None);
    }

    #[test]
    fn test_mask_with_disjoint_region_is_empty() {
        let m =
            RegionMap::from_entries(vec![(region("a", "c"), 1)]).unwrap();
        let masked = m.mask(&region("x", "z"));
        assert!(masked.is_empty());
        assert!(masked.domain().is_empty());
    }

    #[test]
    fn test_update_overlays_and_splits() {
        let m = RegionMap::universal(0u32);
        let overlay = RegionMap::from_entries(vec![(region("c", "f"), 9)]).unwrap();
        let updated = m.update(&overlay).unwrap();
        assert_eq!(updated.domain(), Region::universe());
        assert_eq!(updated.lookup(&key("a")), Some(&0));
        assert_eq!(updated.lookup(&key("c")), Some(&9));
        assert_eq!(updated.lookup(&key("e")), Some(&9));
        assert_eq!(updated.lookup(&key("f")), Some(&0));
        assert_eq!(updated.len(), 3);
    }

    #[test]
    fn test_update_outside_domain_fails() {
        let m = RegionMap::from_entries(vec![(region("c", "f"), 0u32)]).unwrap();
        let overlay = RegionMap::universal(9u32);
        assert!(m.update(&overlay).is_err());
    }

    #[test]
    fn test_update_preserves_totality() {
        let m = RegionMap::universal(0u32);
        let overlay =
            RegionMap::from_entries(vec![(region("b", "d"), 1), (region("d", "g"), 2)]).unwrap();
        let updated = m.update(&overlay).unwrap();
        assert_eq!(updated.domain(), Region::universe());
        // Every boundary key resolves.
        for k in ["", "a", "b", "c", "d", "f", "g", "z"] {
            assert!(updated.lookup(&key(k)).is_some(), "no value at {k:?}");
        }
    }

    #[test]
    fn test_semantic_equality_ignores_splits() {
        let whole = RegionMap::universal(1u32);
        let split = RegionMap::from_entries(vec![
            (region("", "m"), 1),
            (tail("m"), 1),
        ])
        .unwrap();
        assert_eq!(whole, split);
    }

    #[test]
    fn test_semantic_inequality_on_values() {
        let a = RegionMap::universal(1u32);
        let b = RegionMap::from_entries(vec![(region("", "m"), 1), (tail("m"), 2)]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_mask_then_compare_is_update_inverse() {
        let base = RegionMap::universal(0u32);
        let overlay = RegionMap::from_entries(vec![(region("c", "f"), 5)]).unwrap();
        let updated = base.update(&overlay).unwrap();
        assert_eq!(updated.mask(&region("c", "f")), overlay);
    }
}
