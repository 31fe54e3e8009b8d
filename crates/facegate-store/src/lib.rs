//! facegate-store — Durable identity records on the filesystem.
//!
//! One JSON file per `(name, index)` key, named `{name}_{index}.json`
//! inside a configurable directory. Writes go through a temp file and an
//! atomic rename, so concurrent writers to different keys never corrupt
//! each other and same-key writers race with last-write-wins. Scans read
//! record files in lexicographic name order, which gives the matcher a
//! deterministic candidate order.

use facegate_core::IdentityRecord;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const RECORD_EXTENSION: &str = "json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("record serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Filesystem-backed store of identity records.
///
/// Cheap to clone: holds only the directory path and the canonical
/// embedding dimensionality it enforces on writes.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    dir: PathBuf,
    embedding_dim: usize,
}

impl IdentityStore {
    /// Open the store, creating the directory if absent.
    pub fn open(dir: impl Into<PathBuf>, embedding_dim: usize) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, embedding_dim })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn record_path(&self, name: &str, index: usize) -> PathBuf {
        self.dir.join(format!("{name}_{index}.{RECORD_EXTENSION}"))
    }

    /// Write or overwrite the record at `(name, index)`.
    ///
    /// Overwrite is idempotent and not an error. The write is atomic:
    /// serialized to a temp file first, then renamed into place.
    pub fn put(&self, name: &str, index: usize, record: &IdentityRecord) -> Result<(), StoreError> {
        validate_name(name)?;
        if record.condition.trim().is_empty() {
            return Err(StoreError::InvalidRecord("empty condition".into()));
        }
        if record.embedding.dim() != self.embedding_dim {
            return Err(StoreError::InvalidRecord(format!(
                "embedding has {} dimensions, store requires {}",
                record.embedding.dim(),
                self.embedding_dim
            )));
        }

        let path = self.record_path(name, index);
        let tmp = path.with_extension("tmp");
        let data = serde_json::to_vec_pretty(record)?;
        fs::write(&tmp, &data)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!(name, index, path = %path.display(), "record written");
        Ok(())
    }

    /// All stored records, in lexicographic record-file order.
    ///
    /// Reflects every write completed before the call; there is no cache.
    pub fn scan(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        Ok(self.entries()?.into_iter().map(|(_, r)| r).collect())
    }

    /// `(key, record)` pairs in lexicographic key order. The key is the
    /// record file stem, `{name}_{index}`.
    pub fn entries(&self) -> Result<Vec<(String, IdentityRecord)>, StoreError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == RECORD_EXTENSION))
            .collect();
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let data = fs::read(&path)?;
            let record: IdentityRecord = serde_json::from_slice(&data)?;
            let key = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            entries.push((key, record));
        }
        Ok(entries)
    }

    /// Administrative deletion of the record at `(name, index)`.
    ///
    /// Returns `Ok(false)` when no such record exists.
    pub fn remove(&self, name: &str, index: usize) -> Result<bool, StoreError> {
        validate_name(name)?;
        match fs::remove_file(self.record_path(name, index)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a single record by key, if present.
    pub fn get(&self, name: &str, index: usize) -> Result<Option<IdentityRecord>, StoreError> {
        validate_name(name)?;
        match fs::read(self.record_path(name, index)) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Names become file stems, so they must be non-empty and must not be
/// able to escape the storage directory.
fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidRecord("empty name".into()));
    }
    if name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
        return Err(StoreError::InvalidRecord(format!(
            "name {name:?} contains path components"
        )));
    }
    Ok(())
}

/// Default storage directory: `$XDG_DATA_HOME/facegate/storage`, with a
/// `~/.local/share` fallback.
pub fn default_storage_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate/storage")
}
