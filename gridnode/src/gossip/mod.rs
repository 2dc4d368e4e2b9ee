//! The gossip substrate as seen by a node: a key/value broadcast medium with
//! a connectivity signal.

mod local;
mod resolver;

pub use local::LocalGossip;
pub use resolver::Resolver;

use async_trait::async_trait;
use bincode::{Decode, Encode};
use std::sync::Arc;
use thiserror::Error;

use crate::node::{NodeAddress, NodeDescriptor, NodeId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GossipError {
    #[error("no gossip info under key {0:?}")]
    InfoNotFound(String),
    #[error("cannot gossip descriptor of a node without an ID")]
    NodeIdUnset,
    #[error("failed to encode gossip value for {key:?}: {reason}")]
    Encode { key: String, reason: String },
    #[error("gossip storage error: {0}")]
    Storage(String),
}

/// Node addresses persisted so that gossip can reconnect after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct BootstrapInfo {
    pub addresses: Vec<NodeAddress>,
}

/// Durable backing for [`BootstrapInfo`].
#[async_trait]
pub trait GossipStorage: Send + Sync {
    async fn read_bootstrap_info(&self) -> Result<BootstrapInfo, GossipError>;
    async fn write_bootstrap_info(&self, info: &BootstrapInfo) -> Result<(), GossipError>;
}

#[async_trait]
pub trait Gossip: Send + Sync {
    /// Resolves once the substrate is connected to the gossip network.
    /// Waits forever otherwise.
    async fn connected(&self);

    fn get_info(&self, key: &str) -> Result<Vec<u8>, GossipError>;

    fn add_info(&self, key: &str, value: Vec<u8>) -> Result<(), GossipError>;

    async fn set_storage(&self, storage: Arc<dyn GossipStorage>) -> Result<(), GossipError>;

    fn set_node_id(&self, node_id: NodeId);

    /// Publishes `descriptor` under its node-ID key.
    async fn set_node_descriptor(&self, descriptor: &NodeDescriptor) -> Result<(), GossipError>;

    fn get_resolvers(&self) -> Vec<Resolver>;

    fn set_resolvers(&self, resolvers: Vec<Resolver>);
}
