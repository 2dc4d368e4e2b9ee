use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine read error: {0}")]
    ReadError(String),
    #[error("Engine write error: {0}")]
    WriteError(String),
    #[error("Engine capacity exceeded: {used} of {capacity} bytes used, {requested} requested")]
    CapacityExceeded {
        capacity: u64,
        used: u64,
        requested: u64,
    },
}

/// Disk usage of an engine, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Capacity {
    pub capacity: u64,
    pub available: u64,
}

/// Raw key/value storage backing a single store.
///
/// Engines know nothing about identity or ranges; a
/// [`Store`](crate::store::Store) layers those on top.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    /// Human readable name used in logs.
    fn name(&self) -> &str;

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError>;

    /// Insert or overwrite the value under `key`.
    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), EngineError>;

    /// True when the engine holds no keys at all.
    async fn is_empty(&self) -> Result<bool, EngineError>;

    async fn key_count(&self) -> Result<usize, EngineError>;

    async fn capacity(&self) -> Result<Capacity, EngineError>;
}
