//! Metainfo bookkeeping: the region-keyed blob map persisted in the
//! superblock. The cluster layer records version vectors there; this
//! adapter only guarantees the map stays total over the universe.

use bytes::Bytes;

use shrike_btree::WriteTransaction;
use shrike_common::codec;
use shrike_common::error::{CodecError, StoreError};
use shrike_common::region::Region;
use shrike_common::{RegionMap, ShrikeError};

/// Decode the superblock metainfo area into a region map.
///
/// Postcondition: the domain is the universe; anything else means the
/// on-disk pairs were corrupted.
pub fn decode_metainfo(pairs: &[(Vec<u8>, Bytes)]) -> Result<RegionMap<Bytes>, StoreError> {
    let mut entries = Vec::with_capacity(pairs.len());
    for (key_blob, value_blob) in pairs {
        let mut input = key_blob.as_slice();
        let region = codec::decode_region(&mut input)?;
        if !input.is_empty() {
            return Err(StoreError::Corruption(CodecError::BadRegion(
                "trailing bytes after metainfo region".into(),
            )));
        }
        entries.push((region, value_blob.clone()));
    }
    let map = RegionMap::from_entries(entries).map_err(|e| {
        StoreError::Corruption(CodecError::BadRegion(format!(
            "metainfo pairs do not partition the universe: {e}"
        )))
    })?;
    if map.domain() != Region::universe() {
        return Err(StoreError::Corruption(CodecError::BadRegion(format!(
            "metainfo domain is {}, not the universe",
            map.domain()
        ))));
    }
    Ok(map)
}

/// Overlay `new` onto `old` and rewrite the metainfo area: clear, then
/// one `(region_encoding, blob)` pair per entry in left-to-right order.
pub fn update_metainfo(
    txn: &mut WriteTransaction<'_>,
    old: &RegionMap<Bytes>,
    new: &RegionMap<Bytes>,
) -> Result<(), ShrikeError> {
    let updated = old.update(new)?;
    debug_assert_eq!(updated.domain(), Region::universe());
    write_metainfo(txn, &updated);
    Ok(())
}

/// Replace the metainfo area wholesale; `map` must cover the universe.
pub fn write_metainfo(txn: &mut WriteTransaction<'_>, map: &RegionMap<Bytes>) {
    txn.clear_metainfo();
    for (region, blob) in map.iter() {
        let mut key_blob = Vec::new();
        codec::encode_region(&mut key_blob, region);
        txn.push_metainfo_pair(key_blob, blob.clone());
    }
}

/// Check the caller's expectation against the persisted map, then
/// overlay `new` — the atomic composition every write uses. Returns the
/// map as it stood before the overlay.
pub fn check_and_update_metainfo(
    txn: &mut WriteTransaction<'_>,
    expected: &RegionMap<Bytes>,
    new: &RegionMap<Bytes>,
) -> Result<RegionMap<Bytes>, ShrikeError> {
    let current = decode_metainfo(txn.metainfo_pairs())?;
    check_metainfo(&current, expected)?;
    update_metainfo(txn, &current, new)?;
    Ok(current)
}

/// Require that `current` agrees with `expected` over `expected`'s
/// domain. Mismatch is a caller contract violation, surfaced as a
/// recoverable error.
pub fn check_metainfo(
    current: &RegionMap<Bytes>,
    expected: &RegionMap<Bytes>,
) -> Result<(), StoreError> {
    let masked = current.mask(&expected.domain());
    if &masked != expected {
        tracing::error!(
            domain = %expected.domain(),
            "expected metainfo disagrees with persisted metainfo"
        );
        return Err(StoreError::MetainfoMismatch {
            domain: expected.domain().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shrike_btree::{BtreeSlice, Cache, Serializer};
    use shrike_common::config::CacheConfig;
    use shrike_common::region::RightBound;
    use shrike_common::StoreKey;

    fn slice() -> (tempfile::TempDir, BtreeSlice) {
        let dir = tempfile::tempdir().unwrap();
        let serializer = Serializer::create(&dir.path().join("s.shrike")).unwrap();
        let cache = Cache::create(
            serializer,
            CacheConfig {
                max_size: 1 << 20,
                max_dirty_size: 1 << 20,
            },
        )
        .unwrap();
        (dir, BtreeSlice::new(cache))
    }

    fn key(s: &str) -> StoreKey {
        StoreKey::new(s).unwrap()
    }

    fn blob(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn seed_universal(slice: &BtreeSlice, value: &str) {
        let mut txn = slice.begin_write(1).unwrap();
        write_metainfo(&mut txn, &RegionMap::universal(blob(value)));
        txn.commit().unwrap();
    }

    #[test]
    fn test_codec_round_trip_through_superblock() {
        let (_dir, slice) = slice();
        seed_universal(&slice, "v0");
        let read = slice.begin_read();
        let map = decode_metainfo(read.metainfo_pairs()).unwrap();
        assert_eq!(map, RegionMap::universal(blob("v0")));
    }

    #[test]
    fn test_update_splits_and_persists() {
        let (_dir, slice) = slice();
        seed_universal(&slice, "old");
        let split = Region::new(key("c"), RightBound::Key(key("f"))).unwrap();
        {
            let mut txn = slice.begin_write(1).unwrap();
            let old = decode_metainfo(txn.metainfo_pairs()).unwrap();
            let overlay = RegionMap::universal(blob("new")).mask(&split);
            update_metainfo(&mut txn, &old, &overlay).unwrap();
            txn.commit().unwrap();
        }
        let read = slice.begin_read();
        let map = decode_metainfo(read.metainfo_pairs()).unwrap();
        assert_eq!(map.domain(), Region::universe());
        assert_eq!(map.lookup(&key("a")), Some(&blob("old")));
        assert_eq!(map.lookup(&key("d")), Some(&blob("new")));
        assert_eq!(map.lookup(&key("z")), Some(&blob("old")));
        // Three pairs persisted, left to right.
        assert_eq!(read.metainfo_pairs().len(), 3);
    }

    #[test]
    fn test_check_metainfo_accepts_masked_agreement() {
        let (_dir, slice) = slice();
        seed_universal(&slice, "v");
        let read = slice.begin_read();
        let current = decode_metainfo(read.metainfo_pairs()).unwrap();
        let sub = Region::new(key("a"), RightBound::Key(key("m"))).unwrap();
        let expected = current.mask(&sub);
        assert!(check_metainfo(&current, &expected).is_ok());
    }

    #[test]
    fn test_check_metainfo_rejects_disagreement() {
        let (_dir, slice) = slice();
        seed_universal(&slice, "v");
        let read = slice.begin_read();
        let current = decode_metainfo(read.metainfo_pairs()).unwrap();
        let expected = RegionMap::universal(blob("other"));
        let err = check_metainfo(&current, &expected).unwrap_err();
        assert!(matches!(err, StoreError::MetainfoMismatch { .. }));
    }

    #[test]
    fn test_partial_domain_metainfo_is_corruption() {
        let (_dir, slice) = slice();
        {
            let mut txn = slice.begin_write(1).unwrap();
            // A single bounded region cannot cover the universe.
            let bounded =
                RegionMap::from_entries(vec![(
                    Region::new(key("a"), RightBound::Key(key("b"))).unwrap(),
                    blob("x"),
                )])
                .unwrap();
            write_metainfo(&mut txn, &bounded);
            txn.commit().unwrap();
        }
        let read = slice.begin_read();
        assert!(matches!(
            decode_metainfo(read.metainfo_pairs()),
            Err(StoreError::Corruption(_))
        ));
    }

    #[test]
    fn test_garbage_pair_is_corruption() {
        let (_dir, slice) = slice();
        {
            let mut txn = slice.begin_write(1).unwrap();
            txn.push_metainfo_pair(vec![0xee, 0xee], blob("x"));
            txn.commit().unwrap();
        }
        let read = slice.begin_read();
        assert!(matches!(
            decode_metainfo(read.metainfo_pairs()),
            Err(StoreError::Corruption(_))
        ));
    }
}
