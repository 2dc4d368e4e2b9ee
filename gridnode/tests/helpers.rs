#![allow(dead_code)]

use async_trait::async_trait;
use gridnode::clock::Clock;
use gridnode::env::Env;
use gridnode::event_feed::EventFeed;
use gridnode::gossip::{Gossip, GossipError, GossipStorage, LocalGossip, Resolver};
use gridnode::halt::{HaltReceiver, HaltSender, halt_channel};
use gridnode::kv::{KvClient, KvError, LocalKv};
use gridnode::node::{Attributes, NodeConfig, NodeDescriptor, NodeId, NodeInit};
use gridnode::stop::Stopper;
use gridnode::store::{
    Capacity, Engine, EngineError, Store, StoreContext, StoreId, StoreIdent, Stores,
};
use gridnode::InMemoryEngine;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn mem_engines(n: usize) -> Vec<Arc<dyn Engine>> {
    (0..n)
        .map(|i| Arc::new(InMemoryEngine::new(format!("mem-{i}"), 16 << 20)) as Arc<dyn Engine>)
        .collect()
}

/// Config with intervals long enough to stay out of a test's way.
pub fn quiet_config() -> NodeConfig {
    NodeConfig {
        gossip_interval: Duration::from_secs(3600),
        publish_status_interval: Duration::from_secs(3600),
        event_feed_capacity: 1024,
    }
}

/// Persists `ident` into `engine` as if a previous run had bootstrapped it.
pub async fn bootstrap_engine(engine: &Arc<dyn Engine>, cluster_id: &str, node_id: i32, store_id: i32) {
    let ctx = StoreContext {
        gossip: Arc::new(LocalGossip::new()),
        clock: Arc::new(Clock::default()),
        event_feed: Arc::new(EventFeed::new()),
    };
    let store = Store::new(ctx, engine.clone(), NodeDescriptor::default());
    store
        .bootstrap(
            StoreIdent {
                cluster_id: cluster_id.to_string(),
                node_id: NodeId(node_id),
                store_id: StoreId(store_id),
            },
            &Stopper::new(),
        )
        .await
        .unwrap();
}

pub async fn read_ident(engine: &Arc<dyn Engine>) -> Option<StoreIdent> {
    let ctx = StoreContext {
        gossip: Arc::new(LocalGossip::new()),
        clock: Arc::new(Clock::default()),
        event_feed: Arc::new(EventFeed::new()),
    };
    Store::new(ctx, engine.clone(), NodeDescriptor::default())
        .read_ident()
        .await
        .unwrap()
}

/// In-memory counters that record how often they are incremented.
#[derive(Default)]
pub struct CountingKv {
    counters: Mutex<HashMap<Vec<u8>, i64>>,
    calls: AtomicUsize,
}

impl CountingKv {
    pub fn with_counter(key: &[u8], value: i64) -> Self {
        let kv = CountingKv::default();
        kv.counters.lock().unwrap().insert(key.to_vec(), value);
        kv
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvClient for CountingKv {
    async fn increment(&self, key: &[u8], delta: i64) -> Result<i64, KvError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut counters = self.counters.lock().unwrap();
        let value = counters.entry(key.to_vec()).or_default();
        *value += delta;
        Ok(*value)
    }
}

/// Collaborators of a node under construction, wired like `NodeBuilder` does.
pub struct TestNode {
    pub env: Arc<Env>,
    pub gossip: Arc<LocalGossip>,
    pub stores: Arc<Stores>,
    pub stopper: Arc<Stopper>,
    pub halt: HaltSender,
    pub halt_rx: HaltReceiver,
}

impl TestNode {
    /// Uses a key/value client backed by the node's own stores unless `db`
    /// is given.
    pub fn new(gossip: Arc<LocalGossip>, db: Option<Arc<dyn KvClient>>) -> Self {
        let clock = Arc::new(Clock::default());
        let stores = Arc::new(Stores::new(clock.clone()));
        let db = db.unwrap_or_else(|| Arc::new(LocalKv::new(stores.clone())));
        let env = Arc::new(Env::new(
            gossip.clone(),
            db,
            clock,
            Arc::new(EventFeed::new()),
            quiet_config(),
        ));
        let (halt, halt_rx) = halt_channel();
        TestNode {
            env,
            gossip,
            stores,
            stopper: Arc::new(Stopper::new()),
            halt,
            halt_rx,
        }
    }

    pub fn init(&self, addr: &str) -> NodeInit {
        NodeInit::new(
            self.env.clone(),
            self.stores.clone(),
            self.stopper.clone(),
            self.halt.clone(),
            addr.try_into().unwrap(),
            Attributes::default(),
        )
    }

    pub async fn shutdown(&self) {
        self.stopper.stop();
        self.stopper.wait().await;
    }
}

/// Polls `check` until it returns true, failing the test after `timeout`.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// In-memory engine whose capacity queries can be made to fail.
pub struct FlakyEngine {
    inner: InMemoryEngine,
    fail_capacity: AtomicBool,
}

impl FlakyEngine {
    pub fn new(name: &str) -> Self {
        FlakyEngine {
            inner: InMemoryEngine::new(name, 16 << 20),
            fail_capacity: AtomicBool::new(false),
        }
    }

    pub fn fail_capacity(&self, fail: bool) {
        self.fail_capacity.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Engine for FlakyEngine {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), EngineError> {
        self.inner.put(key, value).await
    }

    async fn is_empty(&self) -> Result<bool, EngineError> {
        self.inner.is_empty().await
    }

    async fn key_count(&self) -> Result<usize, EngineError> {
        self.inner.key_count().await
    }

    async fn capacity(&self) -> Result<Capacity, EngineError> {
        if self.fail_capacity.load(Ordering::SeqCst) {
            return Err(EngineError::ReadError("disk stats unavailable".to_string()));
        }
        self.inner.capacity().await
    }
}

/// Gossip that counts store announcements and can be made to reject them.
#[derive(Default)]
pub struct FlakyGossip {
    inner: LocalGossip,
    fail_store_infos: AtomicBool,
    store_infos: AtomicUsize,
}

impl FlakyGossip {
    pub fn fail_store_infos(&self, fail: bool) {
        self.fail_store_infos.store(fail, Ordering::SeqCst);
    }

    pub fn store_infos(&self) -> usize {
        self.store_infos.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Gossip for FlakyGossip {
    async fn connected(&self) {
        self.inner.connected().await
    }

    fn get_info(&self, key: &str) -> Result<Vec<u8>, GossipError> {
        self.inner.get_info(key)
    }

    fn add_info(&self, key: &str, value: Vec<u8>) -> Result<(), GossipError> {
        if key.starts_with("store:") {
            if self.fail_store_infos.load(Ordering::SeqCst) {
                return Err(GossipError::Storage("gossip network unreachable".to_string()));
            }
            self.store_infos.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.add_info(key, value)
    }

    async fn set_storage(&self, storage: Arc<dyn GossipStorage>) -> Result<(), GossipError> {
        self.inner.set_storage(storage).await
    }

    fn set_node_id(&self, node_id: NodeId) {
        self.inner.set_node_id(node_id)
    }

    async fn set_node_descriptor(&self, descriptor: &NodeDescriptor) -> Result<(), GossipError> {
        self.inner.set_node_descriptor(descriptor).await
    }

    fn get_resolvers(&self) -> Vec<Resolver> {
        self.inner.get_resolvers()
    }

    fn set_resolvers(&self, resolvers: Vec<Resolver>) {
        self.inner.set_resolvers(resolvers)
    }
}
