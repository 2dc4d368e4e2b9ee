use dashmap::DashMap;
use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::store::engine::{Capacity, Engine, EngineError};

/// Default capacity of an in-memory engine: 512 MiB.
const DEFAULT_CAPACITY_BYTES: u64 = 512 << 20;

pub struct InMemoryEngine {
    name: String,
    items: DashMap<Vec<u8>, Vec<u8>>,
    capacity: u64,
    used: AtomicU64,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        InMemoryEngine::new("mem", DEFAULT_CAPACITY_BYTES)
    }
}

impl InMemoryEngine {
    pub fn new(name: impl Into<String>, capacity: u64) -> Self {
        InMemoryEngine {
            name: name.into(),
            items: DashMap::new(),
            capacity,
            used: AtomicU64::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Engine for InMemoryEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.items.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), EngineError> {
        let new_size = (key.len() + value.len()) as u64;
        let old_size = self
            .items
            .get(key)
            .map(|v| (key.len() + v.value().len()) as u64)
            .unwrap_or(0);

        let used = self.used.load(Ordering::SeqCst);
        if used.saturating_sub(old_size) + new_size > self.capacity {
            return Err(EngineError::CapacityExceeded {
                capacity: self.capacity,
                used,
                requested: new_size,
            });
        }

        debug!("engine={}; put {} bytes", self.name, new_size);
        self.items.insert(key.to_vec(), value);
        self.used.fetch_add(new_size, Ordering::SeqCst);
        self.used.fetch_sub(old_size, Ordering::SeqCst);
        Ok(())
    }

    async fn is_empty(&self) -> Result<bool, EngineError> {
        Ok(self.items.is_empty())
    }

    async fn key_count(&self) -> Result<usize, EngineError> {
        Ok(self.items.len())
    }

    async fn capacity(&self) -> Result<Capacity, EngineError> {
        let used = self.used.load(Ordering::SeqCst);
        Ok(Capacity {
            capacity: self.capacity,
            available: self.capacity.saturating_sub(used),
        })
    }
}
