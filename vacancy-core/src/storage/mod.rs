pub mod local;
pub mod memory;

/// Blob key of the persisted vote map.
pub const VOTES_KEY: &str = "vac_user_votes";
/// Blob key of the persisted state map.
pub const STATE_KEY: &str = "vac_user_state";

/// Durable local replica: string-keyed blobs, each overwritten wholesale.
/// Implementations: FileReplica (one JSON file per key), MemoryReplica (tests).
pub trait ReplicaBackend: Send + Sync {
    /// Read a blob. `Ok(None)` when nothing has been stored under `key` yet.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the blob stored under `key`.
    fn write(&self, key: &str, contents: &str) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid replica key: {0}")]
    InvalidKey(String),

    #[error("Replica unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
