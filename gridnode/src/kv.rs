//! Minimal key/value client used for counter increments.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::batch::{BatchError, BatchHeader, BatchRequest, Request, Response};
use crate::store::{StoreId, Stores};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("increment of {key:?} failed: {source}")]
    Batch {
        key: Vec<u8>,
        #[source]
        source: BatchError,
    },
    #[error("unexpected response to increment of {0:?}")]
    UnexpectedResponse(Vec<u8>),
    #[error("key/value store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KvClient: Send + Sync {
    /// Atomically adds `delta` to the integer under `key` and returns the new
    /// value. A missing key counts as zero.
    async fn increment(&self, key: &[u8], delta: i64) -> Result<i64, KvError>;
}

/// Sends increments straight to a local [`Stores`] registry, without any
/// network hop.
pub struct LocalKv {
    stores: Arc<Stores>,
}

impl LocalKv {
    pub fn new(stores: Arc<Stores>) -> Self {
        LocalKv { stores }
    }
}

#[async_trait]
impl KvClient for LocalKv {
    async fn increment(&self, key: &[u8], delta: i64) -> Result<i64, KvError> {
        let ba = BatchRequest {
            header: BatchHeader {
                timestamp: self.stores.clock().now(),
                store_id: StoreId::default(),
            },
            requests: vec![Request::Increment {
                key: key.to_vec(),
                increment: delta,
            }],
            trace: None,
        };

        let br = self.stores.send(&ba).await.map_err(|source| KvError::Batch {
            key: key.to_vec(),
            source,
        })?;
        match br.responses.first() {
            Some(Response::Increment { new_value }) => Ok(*new_value),
            _ => Err(KvError::UnexpectedResponse(key.to_vec())),
        }
    }
}
