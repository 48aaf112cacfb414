//! Bounded in-memory cache of raw file bytes.

use crate::types::{DatasetResult, PairedDatasetError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Path -> bytes map that stops admitting entries once `capacity` files are held.
///
/// Entries are never evicted. A poisoned lock only disables caching; reads still
/// go to disk, so the cache never affects what a caller receives.
#[derive(Debug, Default)]
pub struct ByteCache {
    capacity: usize,
    entries: Mutex<HashMap<PathBuf, Arc<[u8]>>>,
}

impl ByteCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries
            .lock()
            .map(|m| m.contains_key(path))
            .unwrap_or(false)
    }

    /// Return the file content, reading from disk on a miss.
    pub fn get(&self, path: &Path) -> DatasetResult<Arc<[u8]>> {
        if let Ok(entries) = self.entries.lock() {
            if let Some(bytes) = entries.get(path) {
                return Ok(Arc::clone(bytes));
            }
        }
        let bytes: Arc<[u8]> = fs::read(path)
            .map_err(|source| PairedDatasetError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .into();
        if self.capacity > 0 {
            if let Ok(mut entries) = self.entries.lock() {
                if entries.len() < self.capacity {
                    entries.insert(path.to_path_buf(), Arc::clone(&bytes));
                }
            }
        }
        Ok(bytes)
    }
}
