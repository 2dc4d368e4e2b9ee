use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

use super::{BootstrapInfo, Gossip, GossipError, GossipStorage, Resolver};
use crate::keys::make_node_id_key;
use crate::node::{NodeDescriptor, NodeId};

/// In-process gossip substrate.
///
/// Instances created through [`LocalGossip::join_network`] share one info map,
/// standing in for a network of gossiping nodes. An instance counts as
/// connected once it has resolvers or [`LocalGossip::mark_connected`] was
/// called.
pub struct LocalGossip {
    infos: Arc<DashMap<String, Vec<u8>>>,
    node_id: AtomicI32,
    resolvers: RwLock<Vec<Resolver>>,
    storage: RwLock<Option<Arc<dyn GossipStorage>>>,
    connected_tx: watch::Sender<bool>,
}

impl Default for LocalGossip {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalGossip {
    pub fn new() -> Self {
        Self::with_infos(Arc::new(DashMap::new()))
    }

    fn with_infos(infos: Arc<DashMap<String, Vec<u8>>>) -> Self {
        let (connected_tx, _) = watch::channel(false);
        LocalGossip {
            infos,
            node_id: AtomicI32::new(0),
            resolvers: RwLock::new(vec![]),
            storage: RwLock::new(None),
            connected_tx,
        }
    }

    /// Another participant of the same gossip network.
    pub fn join_network(&self) -> Self {
        Self::with_infos(self.infos.clone())
    }

    pub fn mark_connected(&self) {
        if !self.connected_tx.send_replace(true) {
            info!("node={}; gossip connected", self.node_id());
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected_tx.borrow()
    }

    pub fn node_id(&self) -> NodeId {
        NodeId(self.node_id.load(Ordering::SeqCst))
    }

    fn resolver_addresses(&self) -> BootstrapInfo {
        let resolvers = self.resolvers.read().unwrap_or_else(|e| e.into_inner());
        BootstrapInfo {
            addresses: resolvers.iter().map(|r| r.address().clone()).collect(),
        }
    }

    /// Adds resolvers not already known. Returns the number added.
    fn merge_resolvers(&self, candidates: impl IntoIterator<Item = Resolver>) -> usize {
        let mut resolvers = self.resolvers.write().unwrap_or_else(|e| e.into_inner());
        let mut added = 0;
        for resolver in candidates {
            if !resolvers.contains(&resolver) {
                resolvers.push(resolver);
                added += 1;
            }
        }
        added
    }
}

#[async_trait]
impl Gossip for LocalGossip {
    async fn connected(&self) {
        let mut rx = self.connected_tx.subscribe();
        // The sender lives as long as `self`, so this only returns once connected.
        let _ = rx.wait_for(|connected| *connected).await;
    }

    fn get_info(&self, key: &str) -> Result<Vec<u8>, GossipError> {
        self.infos
            .get(key)
            .map(|v| v.value().clone())
            .ok_or_else(|| GossipError::InfoNotFound(key.to_string()))
    }

    fn add_info(&self, key: &str, value: Vec<u8>) -> Result<(), GossipError> {
        debug!("node={}; gossip add info {key:?}", self.node_id());
        self.infos.insert(key.to_string(), value);
        Ok(())
    }

    async fn set_storage(&self, storage: Arc<dyn GossipStorage>) -> Result<(), GossipError> {
        let persisted = storage.read_bootstrap_info().await?;
        let added = self.merge_resolvers(persisted.addresses.into_iter().map(Resolver::from_address));
        if added > 0 {
            info!(
                "node={}; added {added} resolver(s) from gossip storage",
                self.node_id()
            );
        }

        *self.storage.write().unwrap_or_else(|e| e.into_inner()) = Some(storage.clone());

        let info = self.resolver_addresses();
        if !info.addresses.is_empty() {
            self.mark_connected();
        }
        storage.write_bootstrap_info(&info).await
    }

    fn set_node_id(&self, node_id: NodeId) {
        self.node_id.store(node_id.value(), Ordering::SeqCst);
    }

    async fn set_node_descriptor(&self, descriptor: &NodeDescriptor) -> Result<(), GossipError> {
        if descriptor.node_id.is_unset() {
            return Err(GossipError::NodeIdUnset);
        }
        let key = make_node_id_key(descriptor.node_id);
        let bytes = bincode::encode_to_vec(descriptor, bincode::config::standard()).map_err(|e| {
            GossipError::Encode {
                key: key.clone(),
                reason: e.to_string(),
            }
        })?;
        self.add_info(&key, bytes)
    }

    fn get_resolvers(&self) -> Vec<Resolver> {
        self.resolvers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_resolvers(&self, resolvers: Vec<Resolver>) {
        let connect = !resolvers.is_empty();
        *self.resolvers.write().unwrap_or_else(|e| e.into_inner()) = resolvers;
        if connect {
            self.mark_connected();
        }
    }
}
