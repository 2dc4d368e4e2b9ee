use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;

use super::{Store, StoreError, StoreId};
use crate::batch::{BatchError, BatchRequest, BatchResponse, ErrorDetail, Sender};
use crate::clock::Clock;
use crate::gossip::{BootstrapInfo, GossipError, GossipStorage};

/// Registry of the stores running in this process, keyed by store ID.
///
/// Stores are added exactly once and never removed. Iteration works on a
/// snapshot, so stores added concurrently with a visit are simply not seen
/// by it.
pub struct Stores {
    clock: Arc<Clock>,
    stores: DashMap<StoreId, Arc<Store>>,
}

impl Stores {
    pub fn new(clock: Arc<Clock>) -> Self {
        Stores {
            clock,
            stores: DashMap::new(),
        }
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    pub fn add_store(&self, store: Arc<Store>) -> Result<(), StoreError> {
        let store_id = store.store_id();
        match self.stores.entry(store_id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyRegistered(store_id)),
            Entry::Vacant(entry) => {
                debug!("stores: registered store {store_id}");
                entry.insert(store);
                Ok(())
            }
        }
    }

    pub fn get_store(&self, store_id: StoreId) -> Option<Arc<Store>> {
        self.stores.get(&store_id).map(|s| s.value().clone())
    }

    pub fn has_store(&self, store_id: StoreId) -> bool {
        self.stores.contains_key(&store_id)
    }

    pub fn get_store_count(&self) -> usize {
        self.stores.len()
    }

    /// Registered stores ordered by store ID.
    pub fn snapshot(&self) -> Vec<Arc<Store>> {
        let mut stores: Vec<Arc<Store>> = self.stores.iter().map(|s| s.value().clone()).collect();
        stores.sort_by_key(|s| s.store_id());
        stores
    }

    /// Calls `visitor` once per registered store, stopping at the first error.
    pub async fn visit_stores<F, Fut, E>(&self, mut visitor: F) -> Result<(), E>
    where
        F: FnMut(Arc<Store>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        for store in self.snapshot() {
            visitor(store).await?;
        }
        Ok(())
    }

    /// Routes `ba` to the store named in its header, or to the store whose
    /// ranges contain the batch key when no store is named.
    pub async fn send(&self, ba: &BatchRequest) -> Result<BatchResponse, BatchError> {
        self.clock.update(&ba.header.timestamp);

        let key = ba
            .key()
            .ok_or_else(|| BatchError::new(ErrorDetail::EmptyBatch, "batch contains no requests"))?;

        let store_id = ba.header.store_id;
        let store = if store_id.is_unset() {
            self.snapshot()
                .into_iter()
                .find(|s| s.owns_key(key))
                .ok_or_else(|| {
                    BatchError::new(
                        ErrorDetail::RangeNotFound { key: key.to_vec() },
                        format!("no local range contains key {key:?}"),
                    )
                })?
        } else {
            self.get_store(store_id).ok_or_else(|| {
                BatchError::new(
                    ErrorDetail::StoreNotFound { store_id },
                    format!("store {store_id} was not found"),
                )
            })?
        };

        store.send(ba).await
    }
}

#[async_trait]
impl GossipStorage for Stores {
    /// Returns the first bootstrap info found across the stores, or an empty
    /// one when none was persisted yet.
    async fn read_bootstrap_info(&self) -> Result<BootstrapInfo, GossipError> {
        for store in self.snapshot() {
            match store.read_gossip_bootstrap().await {
                Ok(Some(info)) => return Ok(info),
                Ok(None) => {}
                Err(e) => warn!("store={store}; unable to read gossip bootstrap info: {e}"),
            }
        }
        Ok(BootstrapInfo::default())
    }

    async fn write_bootstrap_info(&self, info: &BootstrapInfo) -> Result<(), GossipError> {
        for store in self.snapshot() {
            store
                .write_gossip_bootstrap(info)
                .await
                .map_err(|e| GossipError::Storage(format!("store {store}: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Sender for Stores {
    async fn send(&self, ba: &BatchRequest) -> Result<BatchResponse, BatchError> {
        Stores::send(self, ba).await
    }
}
