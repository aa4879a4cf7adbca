//! Partition-file persistence.
//!
//! - `Storage`: minimal blob store the sampling job writes to and every
//!   reduce task reads from.
//! - `FsStorage`: local filesystem.
//! - `MemoryStorage`: map-backed store for tests.
//!
//! A partition file is a JSON document carrying the job parallelism, the
//! skewed-key entries and a blake3 digest of the entries.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use mrplan_core::error::{Error, Result};
use mrplan_core::hash::hash_serde;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::partition::{PartitionEntry, PartitionMap};

pub const PARTITION_FILE_VERSION: u32 = 1;

pub trait Storage: Send + Sync {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;
    fn read(&self, path: &str) -> Result<Vec<u8>>;
    fn exists(&self, path: &str) -> bool;
    fn delete(&self, path: &str) -> Result<()>;
}

/// Local filesystem storage (rooted at current FS).
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for FsStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Storage(format!("mkparent: {e}")))?;
        }
        let mut f = File::create(p).map_err(|e| Error::Storage(format!("create: {e}")))?;
        f.write_all(bytes)
            .map_err(|e| Error::Storage(format!("write: {e}")))?;
        f.flush()
            .map_err(|e| Error::Storage(format!("flush: {e}")))?;
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| Error::Storage(format!("read {path}: {e}")))
    }

    fn exists(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }

    fn delete(&self, path: &str) -> Result<()> {
        let p = Path::new(path);
        if p.exists() {
            fs::remove_file(p).map_err(|e| Error::Storage(format!("delete: {e}")))?;
        }
        Ok(())
    }
}

/// Thread-safe in-memory storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn locked<T>(&self, f: impl FnOnce(&mut HashMap<String, Vec<u8>>) -> T) -> Result<T> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| Error::Storage("memory storage lock poisoned".into()))?;
        Ok(f(&mut data))
    }
}

impl Storage for MemoryStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.locked(|d| {
            d.insert(path.to_string(), bytes.to_vec());
        })
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.locked(|d| d.get(path).cloned())?
            .ok_or_else(|| Error::Storage(format!("path not found: {path}")))
    }

    fn exists(&self, path: &str) -> bool {
        self.locked(|d| d.contains_key(path)).unwrap_or(false)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.locked(|d| {
            d.remove(path);
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PartitionFile {
    version: u32,
    parallelism: u32,
    digest: String,
    entries: Vec<PartitionEntry>,
}

/// Persist `map` at `path`; returns the entries digest.
pub fn write_partition_file(
    storage: &dyn Storage,
    path: &str,
    map: &PartitionMap,
) -> Result<String> {
    let entries: Vec<PartitionEntry> = map.entries().cloned().collect();
    let digest = hash_serde(&entries)?.to_hex();
    let file = PartitionFile {
        version: PARTITION_FILE_VERSION,
        parallelism: map.parallelism(),
        digest: digest.clone(),
        entries,
    };
    let bytes = serde_json::to_vec_pretty(&file)?;
    storage.write(path, &bytes)?;
    trace!(path, skewed_keys = map.len(), digest = %digest, "partition file written");
    Ok(digest)
}

/// Load a partition file, checking its version and digest.
pub fn read_partition_file(storage: &dyn Storage, path: &str) -> Result<PartitionMap> {
    let bytes = storage.read(path)?;
    let file: PartitionFile = serde_json::from_slice(&bytes)?;
    if file.version != PARTITION_FILE_VERSION {
        return Err(Error::Storage(format!(
            "{path}: unsupported partition file version {}",
            file.version
        )));
    }
    let digest = hash_serde(&file.entries)?.to_hex();
    if digest != file.digest {
        return Err(Error::Storage(format!("{path}: partition file digest mismatch")));
    }
    Ok(PartitionMap::from_parts(file.parallelism, file.entries))
}
