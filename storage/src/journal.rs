//! A durable [Store] that persists each committed [Batch] as one checksummed log record.
//!
//! # Format
//!
//! The log is a single file containing a sequence of records:
//!
//! ```text
//! +---+---+---+---+---+---+---+---+---+---+---+---+
//! |   Size (u32)  |  Batch ...    |  CRC32 (u32)  |
//! +---+---+---+---+---+---+---+---+---+---+---+---+
//! ```
//!
//! The batch is encoded with [arbor_codec] as an ordered map of key to optional value
//! (`None` marks a deletion) and the checksum covers the encoded batch.
//!
//! # Atomicity
//!
//! A batch is applied to the in-memory index only after its record has been written and synced.
//! On startup the log is replayed from the beginning; a record that is incomplete or fails its
//! checksum (an unclean shutdown during an append) is discarded together with everything after
//! it and the file is truncated back to the last complete record. A batch is therefore either
//! fully visible after a restart or not visible at all.

use crate::{memory, Batch, Error, Store};
use arbor_codec::{Decode, Encode};
use bytes::{Buf, BufMut, Bytes};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
};
use tracing::{debug, warn};

/// Size of the record header (size) and trailer (checksum).
const RECORD_OVERHEAD: usize = 8;

/// Configuration for [Journal] storage.
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory holding the log file. Created if missing.
    pub directory: PathBuf,

    /// Name of the log file inside `directory`.
    pub file_name: String,
}

struct Inner {
    file: File,
    size: u64,
    index: BTreeMap<Bytes, Bytes>,
}

/// Durable implementation of [Store].
pub struct Journal {
    inner: Mutex<Inner>,
}

impl Journal {
    /// Open the log described by `cfg`, replaying every complete record.
    pub fn init(cfg: Config) -> Result<Self, Error> {
        fs::create_dir_all(&cfg.directory)?;
        let path = cfg.directory.join(&cfg.file_name);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        // Replay records until the end of the file or the first damaged record
        let mut index = BTreeMap::new();
        let mut cursor = 0usize;
        let mut records = 0usize;
        while cursor < raw.len() {
            match Self::parse(&raw[cursor..]) {
                Some((consumed, batch)) => {
                    memory::apply(&mut index, batch);
                    cursor += consumed;
                    records += 1;
                }
                None => break,
            }
        }
        if cursor < raw.len() {
            // This is a best-effort attempt to recover from corruption. If there is an unclean
            // shutdown, it is possible that some trailing record was not fully written to disk.
            warn!(
                path = %path.display(),
                new_size = cursor,
                old_size = raw.len(),
                "corruption detected: truncating log"
            );
            file.set_len(cursor as u64)?;
            file.sync_all()?;
        }
        debug!(path = %path.display(), records, keys = index.len(), "replayed log");

        Ok(Self {
            inner: Mutex::new(Inner {
                file,
                size: cursor as u64,
                index,
            }),
        })
    }

    /// Parse one record from the start of `raw`, returning the bytes consumed and the batch.
    fn parse(raw: &[u8]) -> Option<(usize, Batch)> {
        if raw.len() < RECORD_OVERHEAD {
            return None;
        }
        let mut header = &raw[..4];
        let size = header.get_u32() as usize;
        let end = size.checked_add(RECORD_OVERHEAD)?;
        if raw.len() < end {
            return None;
        }
        let item = &raw[4..4 + size];
        let mut trailer = &raw[4 + size..end];
        if crc32fast::hash(item) != trailer.get_u32() {
            return None;
        }
        let batch = Batch::decode(item).ok()?;
        Some((end, batch))
    }

    /// Number of bytes of valid log data.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }
}

impl Store for Journal {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, Error> {
        Ok(self.inner.lock().index.get(key).cloned())
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>, Error> {
        let inner = self.inner.lock();
        Ok(memory::scan_prefix(&inner.index, prefix))
    }

    fn write(&self, batch: Batch) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }
        let item = batch.encode();
        if item.len() > u32::MAX as usize {
            return Err(Error::RecordTooLarge(item.len()));
        }
        let mut record = Vec::with_capacity(item.len() + RECORD_OVERHEAD);
        record.put_u32(item.len() as u32);
        record.put_slice(&item);
        record.put_u32(crc32fast::hash(&item));

        let mut inner = self.inner.lock();
        let start = inner.size;
        if let Err(err) = append(&mut inner.file, start, &record) {
            // Drop any partial record so later appends are not hidden behind it on replay
            warn!(?err, "append failed: rolling back log");
            inner.file.set_len(start)?;
            return Err(err.into());
        }
        inner.size = start + record.len() as u64;
        memory::apply(&mut inner.index, batch);
        Ok(())
    }
}

/// Write `record` at `offset` and wait for it to reach disk.
fn append(file: &mut File, offset: u64, record: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(record)?;
    file.sync_data()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::env;

    fn config(name: &str) -> Config {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let suffix = rand::thread_rng().gen::<u64>();
        let directory = env::temp_dir().join(format!("arbor_journal_{name}_{suffix}"));
        Config {
            directory,
            file_name: "log".into(),
        }
    }

    fn put(key: &'static [u8], value: &'static [u8]) -> Batch {
        let mut batch = Batch::new();
        batch.put(key, value);
        batch
    }

    #[test]
    fn test_persist_and_replay() {
        let cfg = config("replay");
        {
            let journal = Journal::init(cfg.clone()).unwrap();
            journal.write(put(b"k1", b"v1")).unwrap();
            let mut batch = put(b"k2", b"v2");
            batch.delete(&b"k1"[..]);
            journal.write(batch).unwrap();
        }

        let journal = Journal::init(cfg.clone()).unwrap();
        assert_eq!(journal.get(b"k1").unwrap(), None);
        assert_eq!(journal.get(b"k2").unwrap(), Some(Bytes::from_static(b"v2")));
        fs::remove_dir_all(&cfg.directory).unwrap();
    }

    #[test]
    fn test_empty_batch_not_logged() {
        let cfg = config("empty");
        let journal = Journal::init(cfg.clone()).unwrap();
        journal.write(Batch::new()).unwrap();
        assert_eq!(journal.size(), 0);
        fs::remove_dir_all(&cfg.directory).unwrap();
    }

    #[test]
    fn test_torn_tail_discarded() {
        let cfg = config("torn");
        let valid = {
            let journal = Journal::init(cfg.clone()).unwrap();
            journal.write(put(b"k1", b"v1")).unwrap();
            journal.size()
        };

        // Simulate a crash halfway through the second append
        let path = cfg.directory.join(&cfg.file_name);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0, 0, 0, 64, 1, 2, 3]).unwrap();
        drop(file);

        let journal = Journal::init(cfg.clone()).unwrap();
        assert_eq!(journal.size(), valid);
        assert_eq!(fs::metadata(&path).unwrap().len(), valid);
        assert_eq!(journal.get(b"k1").unwrap(), Some(Bytes::from_static(b"v1")));

        // New appends land after the last good record and survive a restart
        journal.write(put(b"k2", b"v2")).unwrap();
        drop(journal);
        let journal = Journal::init(cfg.clone()).unwrap();
        assert!(journal.has(b"k1").unwrap());
        assert!(journal.has(b"k2").unwrap());
        fs::remove_dir_all(&cfg.directory).unwrap();
    }

    #[test]
    fn test_checksum_mismatch_discards_record() {
        let cfg = config("checksum");
        {
            let journal = Journal::init(cfg.clone()).unwrap();
            journal.write(put(b"k1", b"v1")).unwrap();
            journal.write(put(b"k2", b"v2")).unwrap();
        }

        // Flip the last byte (part of the second record's checksum)
        let path = cfg.directory.join(&cfg.file_name);
        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        fs::write(&path, &raw).unwrap();

        let journal = Journal::init(cfg.clone()).unwrap();
        assert!(journal.has(b"k1").unwrap());
        assert!(!journal.has(b"k2").unwrap());
        fs::remove_dir_all(&cfg.directory).unwrap();
    }
}
