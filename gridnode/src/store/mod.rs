//! Stores: storage engines carrying a persisted identity and hosting ranges
//! of the cluster key space.
//!
//! A [`Store`] wraps one [`Engine`]. Its [`StoreIdent`] is written once by
//! [`Store::bootstrap`] and read back on every [`Store::start`]; an engine
//! without one reports [`StoreError::NotBootstrapped`], which callers treat as
//! "pending bootstrap" rather than as a failure.
//!
//! When the `memory-engine` feature is enabled (default), the built-in
//! [`InMemoryEngine`](memory_engine::InMemoryEngine) is available.

mod engine;
#[cfg(feature = "memory-engine")]
pub mod memory_engine;
mod stores;

pub use engine::{Capacity, Engine, EngineError};
pub use stores::Stores;

use bincode::{Decode, Encode};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use crate::batch::{BatchError, BatchRequest, BatchResponse, ErrorDetail, Request, Response};
use crate::clock::{Clock, HLC};
use crate::event_feed::{Event, EventFeed};
use crate::gossip::{BootstrapInfo, Gossip, GossipError};
use crate::keys::{
    self, GOSSIP_BOOTSTRAP_KEY, KEY_CLUSTER_ID, KEY_MIN, RANGE_DESCRIPTORS_KEY, STORE_IDENT_KEY,
};
use crate::node::{NodeDescriptor, NodeId};
use crate::stop::{StopSignal, Stopper};

/// Cluster-wide store identifier. Zero means "not yet assigned".
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Encode,
    Decode,
    Serialize,
    Deserialize,
)]
pub struct StoreId(pub i32);

impl StoreId {
    pub fn value(self) -> i32 {
        self.0
    }

    pub fn is_unset(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for StoreId {
    fn from(value: i32) -> Self {
        StoreId(value)
    }
}

/// Identity persisted inside an engine at bootstrap. Never changes afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct StoreIdent {
    pub cluster_id: String,
    pub node_id: NodeId,
    pub store_id: StoreId,
}

impl StoreIdent {
    pub fn is_complete(&self) -> bool {
        !self.cluster_id.is_empty() && !self.node_id.is_unset()
    }
}

impl fmt::Display for StoreIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cluster={} node={} store={}",
            self.cluster_id, self.node_id, self.store_id
        )
    }
}

/// Span of keys `[start_key, end_key)` served by a store. `None` as end key
/// means "up to the end of the key space".
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RangeDescriptor {
    pub range_id: i64,
    pub start_key: Vec<u8>,
    pub end_key: Option<Vec<u8>>,
}

impl RangeDescriptor {
    pub fn spanning_all_keys(range_id: i64) -> Self {
        RangeDescriptor {
            range_id,
            start_key: KEY_MIN.to_vec(),
            end_key: None,
        }
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice()
            && self.end_key.as_ref().is_none_or(|end| key < end.as_slice())
    }

    pub fn is_first(&self) -> bool {
        self.start_key == KEY_MIN
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
struct StoredValue {
    data: Vec<u8>,
    timestamp: HLC,
}

/// What a store announces about itself on gossip.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct StoreDescriptor {
    pub store_id: StoreId,
    pub node: NodeDescriptor,
    pub capacity: Capacity,
}

/// Periodic status published by every store to the event feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub store_id: StoreId,
    pub node_id: NodeId,
    pub capacity: Capacity,
    pub range_count: usize,
    pub key_count: usize,
    pub updated_at: HLC,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store on engine {0} has not been bootstrapped")]
    NotBootstrapped(String),
    #[error("engine {0} is not empty, refusing to bootstrap")]
    NotEmpty(String),
    #[error("store {0} is not identified")]
    Unidentified(String),
    #[error("store {0} is already registered")]
    AlreadyRegistered(StoreId),
    #[error("store {0} is stopping")]
    Stopped(String),
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("failed to encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },
    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },
    #[error("Gossip error: {0}")]
    Gossip(#[from] GossipError),
}

/// Collaborators shared by every store of a node.
#[derive(Clone)]
pub struct StoreContext {
    pub gossip: Arc<dyn Gossip>,
    pub clock: Arc<Clock>,
    pub event_feed: Arc<EventFeed>,
}

pub struct Store {
    ctx: StoreContext,
    engine: Arc<dyn Engine>,
    node: NodeDescriptor,
    ident: RwLock<StoreIdent>,
    ranges: RwLock<Vec<RangeDescriptor>>,
    stop_signal: RwLock<Option<StopSignal>>,
    // Held while a batch executes; increments must not interleave.
    latch: tokio::sync::Mutex<()>,
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store_id = self.store_id();
        if store_id.is_unset() {
            write!(f, "{}", self.engine.name())
        } else {
            write!(f, "s{store_id}")
        }
    }
}

impl Store {
    /// Creates a store over `engine`. Nothing is read until [`Store::start`].
    pub fn new(ctx: StoreContext, engine: Arc<dyn Engine>, node: NodeDescriptor) -> Self {
        Store {
            ctx,
            engine,
            node,
            ident: RwLock::new(StoreIdent::default()),
            ranges: RwLock::new(vec![]),
            stop_signal: RwLock::new(None),
            latch: tokio::sync::Mutex::new(()),
        }
    }

    pub fn ident(&self) -> StoreIdent {
        read(&self.ident).clone()
    }

    pub fn store_id(&self) -> StoreId {
        read(&self.ident).store_id
    }

    /// Reads the identity persisted in the engine, if any.
    pub async fn read_ident(&self) -> Result<Option<StoreIdent>, StoreError> {
        match self.engine.get(STORE_IDENT_KEY).await? {
            Some(bytes) => Ok(Some(decode("store ident", &bytes)?)),
            None => Ok(None),
        }
    }

    /// Loads identity and ranges from the engine.
    ///
    /// Returns [`StoreError::NotBootstrapped`] for an engine that was never
    /// bootstrapped. A store holding the first range announces the cluster ID
    /// on gossip.
    pub async fn start(&self, stopper: &Stopper) -> Result<(), StoreError> {
        let ident = self
            .read_ident()
            .await?
            .ok_or_else(|| StoreError::NotBootstrapped(self.engine.name().to_string()))?;

        let ranges: Vec<RangeDescriptor> = match self.engine.get(RANGE_DESCRIPTORS_KEY).await? {
            Some(bytes) => decode("range descriptors", &bytes)?,
            None => vec![],
        };
        let holds_first_range = ranges.iter().any(RangeDescriptor::is_first);
        let range_count = ranges.len();

        *write(&self.ident) = ident.clone();
        *write(&self.ranges) = ranges;
        *write(&self.stop_signal) = Some(stopper.should_stop());

        if holds_first_range && !ident.cluster_id.is_empty() {
            self.ctx
                .gossip
                .add_info(KEY_CLUSTER_ID, ident.cluster_id.as_bytes().to_vec())?;
        }

        info!("store={self}; started ({ident}) with {range_count} range(s)");
        Ok(())
    }

    /// Persists `ident` into an empty engine.
    pub async fn bootstrap(&self, ident: StoreIdent, stopper: &Stopper) -> Result<(), StoreError> {
        if stopper.is_stopping() {
            return Err(StoreError::Stopped(self.to_string()));
        }
        if !self.engine.is_empty().await? {
            return Err(StoreError::NotEmpty(self.engine.name().to_string()));
        }

        self.engine
            .put(STORE_IDENT_KEY, encode("store ident", &ident)?)
            .await?;
        info!(
            "store={}; bootstrapped engine {} as {ident}",
            ident.store_id,
            self.engine.name()
        );
        *write(&self.ident) = ident;
        Ok(())
    }

    /// Writes the range spanning all keys together with its initial data.
    /// Only the first store of a new cluster is ever given this range.
    pub async fn bootstrap_range(&self, initial_values: &[KeyValue]) -> Result<(), StoreError> {
        if !self.ident().is_complete() {
            return Err(StoreError::Unidentified(self.to_string()));
        }

        let ranges = vec![RangeDescriptor::spanning_all_keys(1)];
        self.engine
            .put(RANGE_DESCRIPTORS_KEY, encode("range descriptors", &ranges)?)
            .await?;

        let timestamp = self.ctx.clock.now();
        for kv in initial_values {
            let value = StoredValue {
                data: kv.value.clone(),
                timestamp: timestamp.clone(),
            };
            self.engine
                .put(&kv.key, encode("initial value", &value)?)
                .await?;
        }

        info!(
            "store={self}; bootstrapped first range with {} initial value(s)",
            initial_values.len()
        );
        Ok(())
    }

    pub async fn capacity(&self) -> Result<Capacity, StoreError> {
        Ok(self.engine.capacity().await?)
    }

    /// Announces this store's descriptor and capacity on gossip.
    pub async fn gossip_store(&self) -> Result<(), StoreError> {
        let ident = self.ident();
        if !ident.is_complete() || ident.store_id.is_unset() {
            return Err(StoreError::Unidentified(self.to_string()));
        }

        let capacity = match self.capacity().await {
            Ok(capacity) => capacity,
            Err(e) => {
                warn!("store={self}; could not determine capacity, not gossiping: {e}");
                return Ok(());
            }
        };

        let descriptor = StoreDescriptor {
            store_id: ident.store_id,
            node: NodeDescriptor {
                node_id: ident.node_id,
                ..self.node.clone()
            },
            capacity,
        };
        self.ctx.gossip.add_info(
            &keys::make_store_key(ident.store_id),
            encode("store descriptor", &descriptor)?,
        )?;
        debug!("store={self}; gossiped descriptor {descriptor:?}");
        Ok(())
    }

    /// Publishes the current [`StoreStatus`] to the event feed.
    pub async fn publish_status(&self) -> Result<(), StoreError> {
        let ident = self.ident();
        if !ident.is_complete() {
            return Err(StoreError::Unidentified(self.to_string()));
        }

        let capacity = self.capacity().await?;
        let key_count = self.engine.key_count().await?;
        let range_count = read(&self.ranges).len();

        self.ctx.event_feed.emit(Event::StoreStatus(StoreStatus {
            store_id: ident.store_id,
            node_id: ident.node_id,
            capacity,
            range_count,
            key_count,
            updated_at: self.ctx.clock.now(),
        }));
        Ok(())
    }

    pub async fn read_gossip_bootstrap(&self) -> Result<Option<BootstrapInfo>, StoreError> {
        match self.engine.get(GOSSIP_BOOTSTRAP_KEY).await? {
            Some(bytes) => Ok(Some(decode("gossip bootstrap info", &bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn write_gossip_bootstrap(&self, info: &BootstrapInfo) -> Result<(), StoreError> {
        self.engine
            .put(GOSSIP_BOOTSTRAP_KEY, encode("gossip bootstrap info", info)?)
            .await?;
        Ok(())
    }

    /// True when one of this store's ranges contains `key`. Store-local keys
    /// are never routable.
    pub fn owns_key(&self, key: &[u8]) -> bool {
        !keys::is_local(key) && read(&self.ranges).iter().any(|r| r.contains_key(key))
    }

    fn is_stopping(&self) -> bool {
        read(&self.stop_signal)
            .as_ref()
            .is_some_and(StopSignal::is_stopped)
    }

    /// Executes every request of the batch against this store.
    pub async fn send(&self, ba: &BatchRequest) -> Result<BatchResponse, BatchError> {
        let store_id = self.store_id();
        if self.is_stopping() {
            return Err(BatchError::new(
                ErrorDetail::StoreStopped { store_id },
                format!("store {store_id} is stopping"),
            ));
        }

        let _latch = self.latch.lock().await;
        let mut responses = Vec::with_capacity(ba.requests.len());
        for request in &ba.requests {
            let key = request.key();
            if !self.owns_key(key) {
                return Err(BatchError::new(
                    ErrorDetail::RangeKeyMismatch {
                        key: key.to_vec(),
                        store_id,
                    },
                    format!("key {key:?} is not served by store {store_id}"),
                ));
            }

            let response = match request {
                Request::Get { key } => {
                    let stored = self.read_value(key).await?;
                    Response::Get {
                        timestamp: stored.as_ref().map(|v| v.timestamp.clone()),
                        value: stored.map(|v| v.data),
                    }
                }
                Request::Put { key, value } => {
                    self.write_value(key, value.clone()).await?;
                    Response::Put
                }
                Request::Increment { key, increment } => {
                    let current = match self.read_value(key).await? {
                        Some(stored) => decode_counter(key, &stored.data)?,
                        None => 0,
                    };
                    let new_value = current.checked_add(*increment).ok_or_else(|| {
                        BatchError::new(
                            ErrorDetail::Overflow { key: key.to_vec() },
                            format!("increment of {key:?} by {increment} overflows"),
                        )
                    })?;
                    self.write_value(key, new_value.to_be_bytes().to_vec())
                        .await?;
                    Response::Increment { new_value }
                }
            };
            responses.push(response);
        }

        Ok(BatchResponse {
            responses,
            timestamp: self.ctx.clock.now(),
            error: None,
            collected_spans: vec![],
        })
    }

    async fn read_value(&self, key: &[u8]) -> Result<Option<StoredValue>, BatchError> {
        let bytes = self.engine.get(key).await.map_err(engine_error)?;
        bytes
            .map(|b| decode::<StoredValue>("stored value", &b))
            .transpose()
            .map_err(engine_error)
    }

    async fn write_value(&self, key: &[u8], data: Vec<u8>) -> Result<(), BatchError> {
        let value = StoredValue {
            data,
            timestamp: self.ctx.clock.now(),
        };
        let bytes = encode("stored value", &value).map_err(engine_error)?;
        self.engine.put(key, bytes).await.map_err(engine_error)
    }
}

fn decode_counter(key: &[u8], data: &[u8]) -> Result<i64, BatchError> {
    <[u8; 8]>::try_from(data)
        .map(i64::from_be_bytes)
        .map_err(|_| {
            BatchError::new(
                ErrorDetail::InvalidValue { key: key.to_vec() },
                format!("value under {key:?} is not an integer"),
            )
        })
}

fn engine_error(e: impl fmt::Display) -> BatchError {
    BatchError::new(ErrorDetail::Engine, e.to_string())
}

pub(crate) fn encode<T: Encode>(what: &'static str, value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::encode_to_vec(value, bincode::config::standard()).map_err(|e| StoreError::Encode {
        what,
        reason: e.to_string(),
    })
}

pub(crate) fn decode<T: Decode<()>>(what: &'static str, bytes: &[u8]) -> Result<T, StoreError> {
    bincode::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| StoreError::Decode {
            what,
            reason: e.to_string(),
        })
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
