//! Block-level serializer: one file per store, holding a header and a
//! sequence of checksummed snapshot records.
//!
//! Record layout: `len: u64 | crc32(payload): u32 | payload`. `open`
//! replays to the last intact record and discards a torn tail, so a
//! crash mid-append loses at most the unflushed window. When the file
//! grows well past the live snapshot size it is compacted through a
//! rename, never truncated in place.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use shrike_common::error::{CodecError, StoreError};

const MAGIC: [u8; 8] = *b"SHRKSER1";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: u64 = 12;
/// Record header: `len: u64 | crc32: u32`.
const RECORD_HEADER_LEN: usize = 12;
/// Compact once the file exceeds this multiple of the live snapshot.
const COMPACT_FACTOR: u64 = 4;

pub struct Serializer {
    path: PathBuf,
    file: Mutex<File>,
}

impl Serializer {
    /// Format a fresh file, discarding any previous contents.
    pub fn create(path: &Path) -> Result<Serializer, StoreError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&MAGIC)?;
        file.write_all(&FORMAT_VERSION.to_le_bytes())?;
        file.sync_data()?;
        tracing::debug!(path = %path.display(), "serializer file formatted");
        Ok(Serializer {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Open an existing file, validating the header and replaying to the
    /// last intact snapshot record.
    pub fn open(path: &Path) -> Result<(Serializer, Option<Vec<u8>>), StoreError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        if contents.len() < HEADER_LEN as usize {
            return Err(StoreError::Corruption(CodecError::BadMagic));
        }
        if contents[..8] != MAGIC {
            return Err(StoreError::Corruption(CodecError::BadMagic));
        }
        let version = u32::from_le_bytes(contents[8..12].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(StoreError::Corruption(CodecError::BadVersion(version)));
        }

        let mut last_good: Option<Vec<u8>> = None;
        let mut intact_len = HEADER_LEN as usize;
        let mut cursor = HEADER_LEN as usize;
        while contents.len() - cursor >= RECORD_HEADER_LEN {
            let len = u64::from_le_bytes(contents[cursor..cursor + 8].try_into().unwrap()) as usize;
            let stored = u32::from_le_bytes(contents[cursor + 8..cursor + 12].try_into().unwrap());
            let payload_start = cursor + RECORD_HEADER_LEN;
            let Some(payload_end) = payload_start.checked_add(len) else {
                break;
            };
            if payload_end > contents.len() {
                break; // torn tail
            }
            let payload = &contents[payload_start..payload_end];
            let computed = crc32fast::hash(payload);
            if computed != stored {
                let err = CodecError::ChecksumMismatch { stored, computed };
                tracing::warn!(
                    path = %path.display(),
                    offset = cursor,
                    %err,
                    "discarding snapshot record"
                );
                break;
            }
            last_good = Some(payload.to_vec());
            intact_len = payload_end;
            cursor = payload_end;
        }

        // Drop any torn tail so the next append starts on a record edge.
        if intact_len < contents.len() {
            file.set_len(intact_len as u64)?;
            file.sync_data()?;
        }
        file.seek(SeekFrom::End(0))?;
        Ok((
            Serializer {
                path: path.to_path_buf(),
                file: Mutex::new(file),
            },
            last_good,
        ))
    }

    /// Append a snapshot record, compacting first when the file has grown
    /// past `COMPACT_FACTOR` times the payload.
    pub fn commit_snapshot(&self, payload: &[u8]) -> Result<(), StoreError> {
        let mut file = self.file.lock();
        let record_len = RECORD_HEADER_LEN as u64 + payload.len() as u64;
        let current_len = file.metadata()?.len();
        if current_len > HEADER_LEN + COMPACT_FACTOR * record_len {
            *file = self.compact(payload)?;
            return Ok(());
        }
        file.seek(SeekFrom::End(0))?;
        file.write_all(&(payload.len() as u64).to_le_bytes())?;
        file.write_all(&crc32fast::hash(payload).to_le_bytes())?;
        file.write_all(payload)?;
        file.sync_data()?;
        Ok(())
    }

    /// Rewrite the file as header + one record, atomically via rename.
    fn compact(&self, payload: &[u8]) -> Result<File, StoreError> {
        let tmp_path = self.path.with_extension("compact");
        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(&MAGIC)?;
        tmp.write_all(&FORMAT_VERSION.to_le_bytes())?;
        tmp.write_all(&(payload.len() as u64).to_le_bytes())?;
        tmp.write_all(&crc32fast::hash(payload).to_le_bytes())?;
        tmp.write_all(payload)?;
        tmp.sync_data()?;
        std::fs::rename(&tmp_path, &self.path)?;
        tracing::debug!(path = %self.path.display(), "serializer file compacted");
        Ok(tmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_open_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.shrike");
        Serializer::create(&path).unwrap();
        let (_ser, snapshot) = Serializer::open(&path).unwrap();
        assert!(snapshot.is_none());
    }

    #[test]
    fn test_last_snapshot_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.shrike");
        let ser = Serializer::create(&path).unwrap();
        ser.commit_snapshot(b"one").unwrap();
        ser.commit_snapshot(b"two").unwrap();
        drop(ser);
        let (_ser, snapshot) = Serializer::open(&path).unwrap();
        assert_eq!(snapshot.as_deref(), Some(b"two".as_ref()));
    }

    #[test]
    fn test_torn_tail_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.shrike");
        let ser = Serializer::create(&path).unwrap();
        ser.commit_snapshot(b"good").unwrap();
        drop(ser);
        // Simulate a crash mid-append: a record header with no payload.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&100u64.to_le_bytes()).unwrap();
        file.write_all(&0u32.to_le_bytes()).unwrap();
        drop(file);
        let (_ser, snapshot) = Serializer::open(&path).unwrap();
        assert_eq!(snapshot.as_deref(), Some(b"good".as_ref()));
    }

    #[test]
    fn test_corrupt_checksum_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.shrike");
        let ser = Serializer::create(&path).unwrap();
        ser.commit_snapshot(b"first").unwrap();
        ser.commit_snapshot(b"second").unwrap();
        drop(ser);
        // Flip a byte in the final record's payload.
        let mut contents = std::fs::read(&path).unwrap();
        let last = contents.len() - 1;
        contents[last] ^= 0xff;
        std::fs::write(&path, &contents).unwrap();
        let (_ser, snapshot) = Serializer::open(&path).unwrap();
        assert_eq!(snapshot.as_deref(), Some(b"first".as_ref()));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.shrike");
        std::fs::write(&path, b"NOTSHRIKE___").unwrap();
        assert!(Serializer::open(&path).is_err());
    }

    #[test]
    fn test_compaction_preserves_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.shrike");
        let ser = Serializer::create(&path).unwrap();
        for i in 0..50u32 {
            ser.commit_snapshot(format!("snapshot-{i}").as_bytes()).unwrap();
        }
        let len = std::fs::metadata(&path).unwrap().len();
        // Far smaller than 50 uncompacted records.
        assert!(len < 50 * 16, "file not compacted: {len} bytes");
        drop(ser);
        let (_ser, snapshot) = Serializer::open(&path).unwrap();
        assert_eq!(snapshot.as_deref(), Some(b"snapshot-49".as_ref()));
    }
}
