//! redb-backed cache storage.
//!
//! One database file per cache directory holds three tables: the artifacts
//! keyed by content hash, the generation each artifact was last used in, and
//! cache-wide metadata (the persisted build generation).

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::serialize::{CACHE_FORMAT_VERSION, CacheEntry};

/// Artifact table: content hash (hex) → bincode-serialized [`CacheEntry`].
const ARTIFACTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("artifacts");

/// Usage table: content hash (hex) → generation of last use.
const USAGE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("usage");

/// Metadata table: stores cache-wide metadata.
const METADATA_TABLE: TableDefinition<&str, &str> = TableDefinition::new("metadata");

const GENERATION_KEY: &str = "generation";

/// Error types for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Cache database error.
    #[error("cache database error: {0}")]
    DatabaseError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// IO error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Cache version mismatch.
    #[error("cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// Cache corrupted.
    #[error("cache corrupted: {0}")]
    Corrupted(String),
}

impl From<redb::Error> for CacheError {
    fn from(err: redb::Error) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

impl From<redb::DatabaseError> for CacheError {
    fn from(err: redb::DatabaseError) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

impl From<redb::TableError> for CacheError {
    fn from(err: redb::TableError) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

impl From<redb::TransactionError> for CacheError {
    fn from(err: redb::TransactionError) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

impl From<redb::StorageError> for CacheError {
    fn from(err: redb::StorageError) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

impl From<redb::CommitError> for CacheError {
    fn from(err: redb::CommitError) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

/// Persistent artifact store using redb.
pub struct PersistentStore {
    db: Database,
}

impl std::fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore").finish_non_exhaustive()
    }
}

impl PersistentStore {
    /// Open or create a store at `<cache_dir>/cache.redb`, creating the
    /// directory if needed.
    pub fn open(cache_dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(cache_dir)?;

        let db = Database::create(cache_dir.join("cache.redb"))?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ARTIFACTS_TABLE)?;
            let _ = write_txn.open_table(USAGE_TABLE)?;
            let _ = write_txn.open_table(METADATA_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Load an artifact. `Ok(None)` on a miss; `VersionMismatch` for entries
    /// written by an incompatible format.
    pub fn get(&self, hex: &str) -> Result<Option<CacheEntry>, CacheError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARTIFACTS_TABLE)?;

        let Some(value) = table.get(hex)? else {
            return Ok(None);
        };

        let entry: CacheEntry = bincode::deserialize(value.value())
            .map_err(|e| CacheError::DeserializationError(e.to_string()))?;

        if !entry.metadata.is_compatible() {
            return Err(CacheError::VersionMismatch {
                expected: CACHE_FORMAT_VERSION,
                found: entry.metadata.format_version,
            });
        }

        Ok(Some(entry))
    }

    /// Store an artifact and mark it used in `generation`.
    pub fn put(&self, hex: &str, entry: &CacheEntry, generation: u64) -> Result<(), CacheError> {
        let bytes =
            bincode::serialize(entry).map_err(|e| CacheError::SerializationError(e.to_string()))?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ARTIFACTS_TABLE)?;
            table.insert(hex, bytes.as_slice())?;
            let mut usage = write_txn.open_table(USAGE_TABLE)?;
            usage.insert(hex, generation)?;
        }
        write_txn.commit()?;

        Ok(())
    }

    pub fn contains(&self, hex: &str) -> Result<bool, CacheError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARTIFACTS_TABLE)?;
        Ok(table.get(hex)?.is_some())
    }

    /// Record the last-use generation of several artifacts in one transaction.
    pub fn record_usage<'a>(
        &self,
        entries: impl IntoIterator<Item = (&'a str, u64)>,
    ) -> Result<(), CacheError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut usage = write_txn.open_table(USAGE_TABLE)?;
            for (hex, generation) in entries {
                usage.insert(hex, generation)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Delete artifacts that are not `live` and were last used more than
    /// `max_idle` generations before `generation`. Returns the evicted keys.
    pub fn evict_idle(
        &self,
        generation: u64,
        max_idle: u64,
        live: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<String>, CacheError> {
        let mut evicted = Vec::new();
        {
            let read_txn = self.db.begin_read()?;
            let usage = read_txn.open_table(USAGE_TABLE)?;
            for row in usage.iter()? {
                let (hex, last_used) = row?;
                let hex = hex.value();
                if !live(hex) && generation.saturating_sub(last_used.value()) > max_idle {
                    evicted.push(hex.to_string());
                }
            }
        }

        if evicted.is_empty() {
            return Ok(evicted);
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut artifacts = write_txn.open_table(ARTIFACTS_TABLE)?;
            let mut usage = write_txn.open_table(USAGE_TABLE)?;
            for hex in &evicted {
                artifacts.remove(hex.as_str())?;
                usage.remove(hex.as_str())?;
            }
        }
        write_txn.commit()?;

        Ok(evicted)
    }

    /// The persisted build generation, 0 for a fresh store.
    pub fn generation(&self) -> Result<u64, CacheError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(METADATA_TABLE)?;
        let Some(value) = table.get(GENERATION_KEY)? else {
            return Ok(0);
        };
        value
            .value()
            .parse()
            .map_err(|_| CacheError::Corrupted(format!("generation '{}'", value.value())))
    }

    pub fn set_generation(&self, generation: u64) -> Result<(), CacheError> {
        let value = generation.to_string();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(METADATA_TABLE)?;
            table.insert(GENERATION_KEY, value.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get the number of stored artifacts.
    pub fn len(&self) -> Result<usize, CacheError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ARTIFACTS_TABLE)?;
        Ok(table.iter()?.count())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}
