//! Durable storage for the root blob

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};

/// Trait for durable root blob storage
///
/// Implementations persist one opaque string per root key.
pub trait BlobStorage: Send + Sync {
    /// Load the blob stored under `root_key`, if any
    fn load(&self, root_key: &str) -> Result<Option<String>>;

    /// Replace the blob stored under `root_key`
    fn save(&self, root_key: &str, blob: &str) -> Result<()>;
}

/// In-memory implementation of [`BlobStorage`]
///
/// Writes can be made to fail on demand to exercise quota-style failures.
#[derive(Default)]
pub struct MemoryBlobStorage {
    blobs: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `save` fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl BlobStorage for MemoryBlobStorage {
    fn load(&self, root_key: &str) -> Result<Option<String>> {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(root_key).cloned())
    }

    fn save(&self, root_key: &str, blob: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("storage quota exceeded".to_string()));
        }
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        blobs.insert(root_key.to_string(), blob.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_roundtrip() {
        let storage = MemoryBlobStorage::new();
        assert_eq!(storage.load("root").unwrap(), None);
        storage.save("root", "{}").unwrap();
        assert_eq!(storage.load("root").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_failing_writes_keep_previous_blob() {
        let storage = MemoryBlobStorage::new();
        storage.save("root", "{\"v\":1}").unwrap();
        storage.set_fail_writes(true);
        assert!(storage.save("root", "{\"v\":2}").is_err());
        assert_eq!(storage.load("root").unwrap().as_deref(), Some("{\"v\":1}"));
    }
}
