//! Keyed document store with live snapshot subscriptions.

use crate::error::{PlaceError, Result};
use crate::subscriptions::{DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionManager};
use crate::types::{PlaceKey, PlaceRecord, Revision, Timestamp};
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::journal::{Journal, JournalEntry};
use super::PlaceStore;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base path for the store.
    pub path: PathBuf,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Fsync the journal every N writes.
    pub sync_every: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./places"),
            create_if_missing: true,
            sync_every: 1,
        }
    }
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"PLC\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Mutable store contents.
#[derive(Default)]
struct Documents {
    places: HashMap<PlaceKey, PlaceRecord>,
    revision: Revision,
    /// Last `modified_at` handed out, for monotonic stamping.
    last_stamp: Timestamp,
}

impl Documents {
    fn apply(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Put(record) => {
                self.last_stamp = self.last_stamp.max(record.modified_at);
                self.places.insert(record.key.clone(), record);
            }
            JournalEntry::Remove(key) => {
                self.places.remove(&key);
            }
        }
        self.revision = self.revision.next();
    }

    fn next_stamp(&mut self) -> Timestamp {
        let stamp = Timestamp::now().max(self.last_stamp.successor());
        self.last_stamp = stamp;
        stamp
    }

    fn snapshot(&self) -> Vec<PlaceRecord> {
        self.places.values().cloned().collect()
    }
}

/// The shared place store.
///
/// Documents are keyed by [`PlaceKey`]. Every mutation is journaled (when
/// durable), applied, and then pushed to all subscribers while the write
/// lock is still held, so every subscriber observes the same order.
pub struct DocumentStore {
    documents: RwLock<Documents>,

    subscriptions: Arc<SubscriptionManager>,

    /// None for in-memory stores.
    journal: Option<Journal>,

    /// Lock file for exclusive access.
    _lock_file: Option<File>,

    path: Option<PathBuf>,
}

impl DocumentStore {
    /// Create a store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            documents: RwLock::new(Documents::default()),
            subscriptions: Arc::new(SubscriptionManager::new()),
            journal: None,
            _lock_file: None,
            path: None,
        }
    }

    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(PlaceError::NotInitialized)
        }
    }

    /// Create a new durable store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let (journal, _) = Journal::open(config.path.join("places.journal"), config.sync_every)?;
        info!(path = %config.path.display(), "created place store");

        Ok(Self {
            documents: RwLock::new(Documents::default()),
            subscriptions: Arc::new(SubscriptionManager::new()),
            journal: Some(journal),
            _lock_file: Some(lock_file),
            path: Some(config.path),
        })
    }

    /// Open an existing durable store, replaying its journal.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let (journal, entries) =
            Journal::open(config.path.join("places.journal"), config.sync_every)?;

        let mut documents = Documents::default();
        for entry in entries {
            if let JournalEntry::Put(ref record) = entry {
                if let Err(e) = record.verify_key() {
                    warn!(key = %record.key, error = %e, "skipping journaled record");
                    continue;
                }
            }
            documents.apply(entry);
        }
        info!(
            path = %config.path.display(),
            places = documents.places.len(),
            revision = ?documents.revision,
            "opened place store"
        );

        Ok(Self {
            documents: RwLock::new(documents),
            subscriptions: Arc::new(SubscriptionManager::new()),
            journal: Some(journal),
            _lock_file: Some(lock_file),
            path: Some(config.path),
        })
    }

    /// Number of stored places.
    pub fn len(&self) -> usize {
        self.documents.read().places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a single place.
    pub fn get(&self, key: &PlaceKey) -> Option<PlaceRecord> {
        self.documents.read().places.get(key).cloned()
    }

    /// Mutations applied so far.
    pub fn revision(&self) -> Revision {
        self.documents.read().revision
    }

    /// Live subscriber count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }

    /// The store directory, if durable.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rewrite the journal to hold one entry per live place.
    pub fn compact(&self) -> Result<()> {
        let documents = self.documents.write();
        if let Some(journal) = &self.journal {
            let entries: Vec<JournalEntry> = documents
                .places
                .values()
                .cloned()
                .map(JournalEntry::Put)
                .collect();
            journal.rewrite(&entries)?;
            debug!(places = entries.len(), "compacted journal");
        }
        Ok(())
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.sync()?;
        }
        Ok(())
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(PlaceError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(PlaceError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| PlaceError::Locked)?;

        Ok(lock_file)
    }
}

impl PlaceStore for DocumentStore {
    fn read_all(&self) -> Result<Vec<PlaceRecord>> {
        Ok(self.documents.read().snapshot())
    }

    fn subscribe(&self, config: SubscriptionConfig) -> Result<SubscriptionHandle> {
        // Read guard excludes writers, so nothing can land between the
        // initial snapshot and registration.
        let documents = self.documents.read();
        Ok(self
            .subscriptions
            .subscribe(config, documents.snapshot(), documents.revision))
    }

    fn put(&self, key: &PlaceKey, mut record: PlaceRecord) -> Result<()> {
        record.verify_key()?;
        if record.key != *key {
            return Err(PlaceError::InconsistentKey {
                expected: record.key,
                got: key.clone(),
            });
        }

        let mut documents = self.documents.write();
        record.modified_at = documents.next_stamp();

        let entry = JournalEntry::Put(record);
        if let Some(journal) = &self.journal {
            journal.append(&entry)?;
        }
        documents.apply(entry);
        debug!(key = %key, revision = ?documents.revision, "put place");

        self.subscriptions
            .broadcast_snapshot(&documents.snapshot(), documents.revision);
        Ok(())
    }

    fn remove(&self, key: &PlaceKey) -> Result<()> {
        let mut documents = self.documents.write();
        if !documents.places.contains_key(key) {
            debug!(key = %key, "remove of absent place");
            return Ok(());
        }

        let entry = JournalEntry::Remove(key.clone());
        if let Some(journal) = &self.journal {
            journal.append(&entry)?;
        }
        documents.apply(entry);
        debug!(key = %key, revision = ?documents.revision, "removed place");

        self.subscriptions
            .broadcast_snapshot(&documents.snapshot(), documents.revision);
        Ok(())
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        self.subscriptions.close_all(DropReason::StoreClosed);
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
