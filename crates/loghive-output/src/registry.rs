//! Per-source sink registry
//!
//! Maps each `(token, type, name)` key to one open [`RotatingFile`] under
//! `<root>/<token>/<type>/<name>`. Sinks are created on first use and live
//! for the rest of the process: the map only grows, bounded by the number of
//! distinct sources seen.
//!
//! A miss creates the directory and opens the file while holding the write
//! lock of the key's map shard. Lookups of other keys hashed to that shard
//! wait for the open to finish; keys in other shards are unaffected.

use crate::file::RotatingFile;
use dashmap::DashMap;
use loghive_core::config::StorageConfig;
use loghive_core::{SinkKey, StorageError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

/// One source's log destination
///
/// Writes through the same sink are serialised; different sinks never
/// contend with each other.
#[derive(Debug)]
pub struct Sink {
    key: SinkKey,
    file: Mutex<RotatingFile>,
}

impl Sink {
    /// Append a line to the sink's active file
    pub fn append(&self, line: &str) -> Result<(), StorageError> {
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.append(line)
    }

    pub fn key(&self) -> &SinkKey {
        &self.key
    }

    /// Active file path
    pub fn path(&self) -> PathBuf {
        self.file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .path()
            .to_path_buf()
    }
}

/// Process-wide cache of open sinks
#[derive(Debug)]
pub struct SinkRegistry {
    root: PathBuf,
    max_files: usize,
    sinks: DashMap<SinkKey, Arc<Sink>>,
}

impl SinkRegistry {
    /// Create a registry rooted at `root`, keeping `max_files` rotations per sink
    pub fn new(root: impl Into<PathBuf>, max_files: usize) -> Self {
        Self {
            root: root.into(),
            max_files,
            sinks: DashMap::new(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.logs_dir.clone(), config.max_files)
    }

    /// Root logs directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the sink for `key`, creating its directory and file on first use
    ///
    /// Concurrent first calls for the same key open the file exactly once.
    pub fn get_sink(&self, key: &SinkKey) -> Result<Arc<Sink>, StorageError> {
        if let Some(sink) = self.sinks.get(key) {
            return Ok(Arc::clone(sink.value()));
        }

        let sink = self
            .sinks
            .entry(key.clone())
            .or_try_insert_with(|| self.open_sink(key).map(Arc::new))?;
        Ok(Arc::clone(sink.value()))
    }

    /// Append `line` to the sink for `key`
    pub fn write(&self, key: &SinkKey, line: &str) -> Result<(), StorageError> {
        self.get_sink(key)?.append(line)
    }

    /// Number of open sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn open_sink(&self, key: &SinkKey) -> Result<Sink, StorageError> {
        let dir = self.root.join(key.relative_dir()?);
        let path = dir.join(key.file_name()?);

        // create_dir_all tolerates a concurrent creator of the same directory
        fs::create_dir_all(&dir).map_err(|e| StorageError::CreateDir {
            path: dir.display().to_string(),
            source: e,
        })?;

        let file = RotatingFile::open(path, self.max_files)?;
        // Runs under the map's shard lock (see module docs): must not call back
        // into `self.sinks`
        info!(sink = %key, path = %file.path().display(), "Created sink");

        Ok(Sink {
            key: key.clone(),
            file: Mutex::new(file),
        })
    }
}
