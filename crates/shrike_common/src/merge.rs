//! Merge-ordered iterator: stitches N ascending `(key, value)` sequences
//! into one globally ascending sequence via a min-heap on the current key.
//!
//! Ties between sources are impossible when the sources come from
//! disjoint shards; that assumption is debug-asserted.

use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::key::StoreKey;

struct Head {
    key: StoreKey,
    value: Bytes,
    src: usize,
}

// Max-heap inverted into a min-heap: compare reversed on (key, src).
impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.src.cmp(&self.src))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.src == other.src
    }
}

impl Eq for Head {}

pub struct MergeOrderedIter<I> {
    sources: Vec<I>,
    heap: BinaryHeap<Head>,
    #[cfg(debug_assertions)]
    last_key: Option<StoreKey>,
}

impl<I> MergeOrderedIter<I>
where
    I: Iterator<Item = (StoreKey, Bytes)>,
{
    pub fn new(mut sources: Vec<I>) -> MergeOrderedIter<I> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (src, source) in sources.iter_mut().enumerate() {
            if let Some((key, value)) = source.next() {
                heap.push(Head { key, value, src });
            }
        }
        MergeOrderedIter {
            sources,
            heap,
            #[cfg(debug_assertions)]
            last_key: None,
        }
    }
}

impl<I> Iterator for MergeOrderedIter<I>
where
    I: Iterator<Item = (StoreKey, Bytes)>,
{
    type Item = (StoreKey, Bytes);

    fn next(&mut self) -> Option<(StoreKey, Bytes)> {
        let head = self.heap.pop()?;
        if let Some((key, value)) = self.sources[head.src].next() {
            self.heap.push(Head {
                key,
                value,
                src: head.src,
            });
        }
        #[cfg(debug_assertions)]
        {
            if let Some(last) = &self.last_key {
                debug_assert!(
                    &head.key > last,
                    "merge sources produced non-disjoint or unsorted keys"
                );
            }
            self.last_key = Some(head.key.clone());
        }
        Some((head.key, head.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[&str]) -> Vec<(StoreKey, Bytes)> {
        items
            .iter()
            .map(|s| {
                (
                    StoreKey::new(*s).unwrap(),
                    Bytes::copy_from_slice(s.as_bytes()),
                )
            })
            .collect()
    }

    fn keys_of(iter: impl Iterator<Item = (StoreKey, Bytes)>) -> Vec<String> {
        iter.map(|(k, _)| format!("{k}")).collect()
    }

    #[test]
    fn test_merges_interleaved_ranges() {
        let a = pairs(&["a", "d", "g"]);
        let b = pairs(&["b", "e"]);
        let c = pairs(&["c", "f"]);
        let merged = MergeOrderedIter::new(vec![a.into_iter(), b.into_iter(), c.into_iter()]);
        assert_eq!(keys_of(merged), vec!["a", "b", "c", "d", "e", "f", "g"]);
    }

    #[test]
    fn test_merges_contiguous_shards() {
        let a = pairs(&["a", "b"]);
        let b = pairs(&["c"]);
        let merged = MergeOrderedIter::new(vec![a.into_iter(), b.into_iter()]);
        assert_eq!(keys_of(merged), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_sources() {
        let empty: Vec<(StoreKey, Bytes)> = Vec::new();
        let merged = MergeOrderedIter::new(vec![empty.into_iter()]);
        assert_eq!(keys_of(merged), Vec::<String>::new());
    }

    #[test]
    fn test_single_source_passthrough() {
        let a = pairs(&["x", "y", "z"]);
        let merged = MergeOrderedIter::new(vec![a.into_iter()]);
        assert_eq!(keys_of(merged), vec!["x", "y", "z"]);
    }
}
