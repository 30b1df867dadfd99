/// In-memory replica backend, with a switch to make writes fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{ReplicaBackend, StorageError};

#[derive(Default)]
pub struct MemoryReplica {
    blobs: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob before the store reads it.
    pub fn with_blob(self, key: &str, contents: &str) -> Self {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), contents.to_string());
        self
    }

    /// Make every subsequent write fail (simulates a full or locked disk).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn blob(&self, key: &str) -> Option<String> {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}

impl ReplicaBackend for MemoryReplica {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.blob(key))
    }

    fn write(&self, key: &str, contents: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("write to {} refused", key)));
        }
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), contents.to_string());
        Ok(())
    }
}
