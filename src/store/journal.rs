//! Append-only journal of document mutations.
//!
//! Every put and remove is framed as `len | msgpack | crc32` and appended
//! before it is applied in memory. Opening the journal replays all intact
//! frames; a torn or corrupt tail is cut off so later appends stay readable.

use crate::error::{PlaceError, Result};
use crate::types::{PlaceKey, PlaceRecord};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Magic bytes for journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"PJL\0";

/// Current journal format version.
const JOURNAL_VERSION: u8 = 1;

/// Header size (magic + version).
const JOURNAL_HEADER_SIZE: u64 = 5;

/// Frames larger than this are treated as corruption.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// A single journaled mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum JournalEntry {
    Put(PlaceRecord),
    Remove(PlaceKey),
}

/// Open append handle plus the length of the intact prefix.
struct JournalWriter {
    file: BufWriter<File>,
    /// Bytes known to hold whole frames.
    committed_len: u64,
}

/// Journal file manager.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    /// Number of appends since the last fsync.
    writes_since_sync: Mutex<u64>,
    /// Fsync every N appends (1 = every append).
    sync_every: u64,
}

impl Journal {
    /// Open or create a journal, returning the intact entries in write order.
    pub fn open(path: impl AsRef<Path>, sync_every: u64) -> Result<(Self, Vec<JournalEntry>)> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() && fs::metadata(&path)?.len() > 0 {
            Self::replay(&path)?
        } else {
            let mut file = File::create(&path)?;
            Self::write_header(&mut file)?;
            Vec::new()
        };

        let file = OpenOptions::new().append(true).open(&path)?;
        let committed_len = file.metadata()?.len();

        Ok((
            Self {
                path,
                writer: Mutex::new(JournalWriter {
                    file: BufWriter::new(file),
                    committed_len,
                }),
                writes_since_sync: Mutex::new(0),
                sync_every: sync_every.max(1),
            },
            entries,
        ))
    }

    /// Append an entry.
    ///
    /// A failed append leaves the file as it was before the call, so an
    /// entry that was reported as failed never shows up on replay.
    pub fn append(&self, entry: &JournalEntry) -> Result<()> {
        let frame = Self::encode_frame(entry)?;
        let mut writer = self.writer.lock();

        let written = match writer.file.write_all(&frame) {
            Ok(()) => writer.file.flush(),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(error = %e, offset = writer.committed_len, "journal append failed");
            self.discard_uncommitted(&mut writer)?;
            return Err(e.into());
        }
        writer.committed_len += frame.len() as u64;

        let mut writes = self.writes_since_sync.lock();
        *writes += 1;
        if *writes >= self.sync_every {
            writer.file.get_ref().sync_all()?;
            *writes = 0;
        }

        Ok(())
    }

    /// Drop buffered bytes and cut the file back to the last whole frame.
    fn discard_uncommitted(&self, writer: &mut JournalWriter) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        file.set_len(writer.committed_len)?;

        let stale = std::mem::replace(&mut writer.file, BufWriter::new(file));
        // into_parts hands back the buffer without flushing it
        let _ = stale.into_parts();
        Ok(())
    }

    /// Replace the journal contents with `entries`.
    ///
    /// Writes a sibling file and renames it over the journal, so a crash
    /// leaves either the old or the new journal intact.
    pub fn rewrite(&self, entries: &[JournalEntry]) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.file.flush()?;

        let tmp_path = self.path.with_extension("journal.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            Self::write_header(&mut tmp)?;
            for entry in entries {
                tmp.write_all(&Self::encode_frame(entry)?)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        writer.committed_len = file.metadata()?.len();
        writer.file = BufWriter::new(file);
        *self.writes_since_sync.lock() = 0;

        Ok(())
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.file.flush()?;
        writer.file.get_ref().sync_all()?;
        *self.writes_since_sync.lock() = 0;
        Ok(())
    }

    /// Current journal size in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn write_header(writer: &mut impl Write) -> Result<()> {
        writer.write_all(JOURNAL_MAGIC)?;
        writer.write_all(&[JOURNAL_VERSION])?;
        Ok(())
    }

    fn replay(path: &Path) -> Result<Vec<JournalEntry>> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != JOURNAL_MAGIC {
            return Err(PlaceError::InvalidFormat("Invalid journal magic".into()));
        }

        let mut version = [0u8; 1];
        reader.read_exact(&mut version)?;
        if version[0] != JOURNAL_VERSION {
            return Err(PlaceError::InvalidFormat(format!(
                "Unsupported journal version: {}",
                version[0]
            )));
        }

        let mut entries = Vec::new();
        let mut good_offset = JOURNAL_HEADER_SIZE;

        loop {
            match Self::read_frame(&mut reader) {
                Ok(Some((entry, frame_len))) => {
                    entries.push(entry);
                    good_offset += frame_len;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, offset = good_offset, "damaged journal frame");
                    break;
                }
            }
        }
        drop(reader);

        // A short length prefix also ends the loop cleanly, so compare sizes.
        if fs::metadata(path)?.len() > good_offset {
            warn!(offset = good_offset, "truncating journal tail");
            OpenOptions::new().write(true).open(path)?.set_len(good_offset)?;
        }

        Ok(entries)
    }

    fn encode_frame(entry: &JournalEntry) -> Result<Vec<u8>> {
        let encoded = rmp_serde::to_vec(entry)?;

        let mut frame = Vec::with_capacity(encoded.len() + 8);
        frame.extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        frame.extend_from_slice(&encoded);
        frame.extend_from_slice(&crc32fast::hash(&encoded).to_le_bytes());

        Ok(frame)
    }

    /// Read one frame. `Ok(None)` means a clean end of file.
    fn read_frame(reader: &mut impl Read) -> Result<Option<(JournalEntry, u64)>> {
        let mut len_bytes = [0u8; 4];
        match reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > MAX_FRAME_SIZE {
            return Err(PlaceError::Corruption("Journal frame too large".into()));
        }

        let mut encoded = vec![0u8; len];
        reader.read_exact(&mut encoded)?;

        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);

        let computed_checksum = crc32fast::hash(&encoded);
        if stored_checksum != computed_checksum {
            return Err(PlaceError::Corruption("Journal checksum mismatch".into()));
        }

        let entry = rmp_serde::from_slice(&encoded)?;
        Ok(Some((entry, 4 + len as u64 + 4)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;
    use tempfile::TempDir;

    fn place(lat: f64) -> PlaceRecord {
        PlaceRecord::new("Pier", "Fishing spot", None, Position::new(lat, 10.0).unwrap())
    }

    #[test]
    fn test_journal_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("places.journal");

        {
            let (journal, entries) = Journal::open(&path, 1).unwrap();
            assert!(entries.is_empty());
            journal.append(&JournalEntry::Put(place(1.0))).unwrap();
            journal.append(&JournalEntry::Put(place(2.0))).unwrap();
            journal
                .append(&JournalEntry::Remove(place(1.0).key))
                .unwrap();
        }

        let (_journal, entries) = Journal::open(&path, 1).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2], JournalEntry::Remove(place(1.0).key));
    }

    #[test]
    fn test_torn_tail_is_cut() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("places.journal");

        {
            let (journal, _) = Journal::open(&path, 1).unwrap();
            journal.append(&JournalEntry::Put(place(1.0))).unwrap();
        }

        // Half-written frame
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&200u32.to_le_bytes()).unwrap();
            file.write_all(b"partial").unwrap();
        }

        {
            let (journal, entries) = Journal::open(&path, 1).unwrap();
            assert_eq!(entries.len(), 1);
            journal.append(&JournalEntry::Put(place(3.0))).unwrap();
        }

        let (_journal, entries) = Journal::open(&path, 1).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_failed_append_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("places.journal");

        let (journal, _) = Journal::open(&path, 1).unwrap();
        journal.append(&JournalEntry::Put(place(1.0))).unwrap();
        let committed = journal.size().unwrap();

        // Bytes from a write that errored out midway
        {
            let mut writer = journal.writer.lock();
            writer.file.write_all(&64u32.to_le_bytes()).unwrap();
            writer.file.write_all(b"half a frame").unwrap();
            writer.file.get_mut().write_all(b"on disk too").unwrap();
            journal.discard_uncommitted(&mut writer).unwrap();
        }
        assert_eq!(journal.size().unwrap(), committed);

        journal.append(&JournalEntry::Put(place(2.0))).unwrap();
        drop(journal);

        let (_journal, entries) = Journal::open(&path, 1).unwrap();
        let keys: Vec<PlaceKey> = entries
            .into_iter()
            .map(|entry| match entry {
                JournalEntry::Put(record) => record.key,
                JournalEntry::Remove(key) => key,
            })
            .collect();
        assert_eq!(keys, vec![place(1.0).key, place(2.0).key]);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("places.journal");
        fs::write(&path, b"NOPE\x01").unwrap();

        assert!(matches!(
            Journal::open(&path, 1),
            Err(PlaceError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_rewrite_shrinks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("places.journal");

        let (journal, _) = Journal::open(&path, 100).unwrap();
        for i in 0..20 {
            journal.append(&JournalEntry::Put(place(i as f64))).unwrap();
        }
        let before = journal.size().unwrap();

        journal.rewrite(&[JournalEntry::Put(place(0.0))]).unwrap();
        assert!(journal.size().unwrap() < before);

        journal.append(&JournalEntry::Put(place(1.0))).unwrap();
        drop(journal);

        let (_journal, entries) = Journal::open(&path, 1).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
