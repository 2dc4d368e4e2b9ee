//! Builder pattern for creating and starting nodes.
//!
//! # Example
//!
//! ```no_run
//! use gridnode::node::NodeBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Seed a new cluster from one in-memory engine
//!     let node = NodeBuilder::new()
//!         .address("127.0.0.1:26257")?
//!         .build()
//!         .await?;
//!
//!     // Graceful shutdown on Ctrl+C
//!     node.run_until_shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use crate::batch::Sender;
use crate::clock::Clock;
use crate::env::Env;
use crate::event_feed::EventFeed;
use crate::gossip::{Gossip, LocalGossip, Resolver};
use crate::halt::halt_channel;
use crate::kv::{KvClient, LocalKv};
use crate::rpc::RpcServer;
use crate::stop::Stopper;
use crate::store::{Engine, Stores};

use super::address::NodeAddress;
use super::types::{Attributes, NodeConfig, NodeError};
use super::{Node, NodeRuntime};

/// Builder for creating and starting a node.
///
/// At minimum an address is required. Without engines, a single in-memory
/// engine is used (feature `memory-engine`). Without join peers, a node whose
/// engines are all blank seeds a new cluster.
pub struct NodeBuilder {
    address: Option<NodeAddress>,
    attrs: Attributes,
    engines: Vec<Arc<dyn Engine>>,
    join_peers: Vec<Resolver>,
    config: Option<NodeConfig>,
    gossip: Option<Arc<dyn Gossip>>,
    db: Option<Arc<dyn KvClient>>,
    rpc: Option<Arc<RpcServer>>,
    event_feed: Option<Arc<EventFeed>>,
    sender: Option<Arc<dyn Sender>>,
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeBuilder {
    /// Create a new NodeBuilder with default settings.
    pub fn new() -> Self {
        Self {
            address: None,
            attrs: Attributes::default(),
            engines: vec![],
            join_peers: vec![],
            config: None,
            gossip: None,
            db: None,
            rpc: None,
            event_feed: None,
            sender: None,
        }
    }

    /// Set the address this node is reachable at.
    /// Format: "host:port" (e.g., "127.0.0.1:26257")
    pub fn address(mut self, addr: &str) -> Result<Self, NodeError> {
        self.address = Some(
            addr.try_into()
                .map_err(|e| NodeError::ConfigurationError(format!("Invalid address: {e}")))?,
        );
        Ok(self)
    }

    pub fn attrs(mut self, attrs: &[&str]) -> Self {
        self.attrs = Attributes(attrs.iter().map(|a| a.to_string()).collect());
        self
    }

    /// Add a storage engine. Engines are started in the order they are added.
    pub fn engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.engines.push(engine);
        self
    }

    /// Add a peer to join an existing cluster through.
    pub fn join_peer(mut self, addr: &str) -> Result<Self, NodeError> {
        let resolver = Resolver::try_from(addr)
            .map_err(|e| NodeError::ConfigurationError(format!("Invalid peer address: {e}")))?;
        self.join_peers.push(resolver);
        Ok(self)
    }

    /// Tunables. Defaults to [`NodeConfig::from_env`].
    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Gossip substrate. Defaults to a fresh [`LocalGossip`].
    pub fn gossip(mut self, gossip: Arc<dyn Gossip>) -> Self {
        self.gossip = Some(gossip);
        self
    }

    /// Client used to allocate node and store IDs. Defaults to a client
    /// backed by this node's own stores.
    pub fn kv_client(mut self, db: Arc<dyn KvClient>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn rpc_server(mut self, rpc: Arc<RpcServer>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    pub fn event_feed(mut self, event_feed: Arc<EventFeed>) -> Self {
        self.event_feed = Some(event_feed);
        self
    }

    /// Executes incoming batches. Defaults to the node's own store registry.
    pub fn sender(mut self, sender: Arc<dyn Sender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Build and start the node.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The address is missing or the configuration is invalid
    /// - No engine is given and the `memory-engine` feature is disabled
    /// - Store initialization or cluster bootstrap fails
    pub async fn build(self) -> Result<NodeRuntime, NodeError> {
        let address = self
            .address
            .ok_or_else(|| NodeError::ConfigurationError("Address is required".to_string()))?;

        let config = match self.config {
            Some(config) => config,
            None => NodeConfig::from_env()?,
        };
        config.validate()?;

        let engines = if self.engines.is_empty() {
            default_engines()?
        } else {
            self.engines
        };

        let clock = Arc::new(Clock::default());
        let stores = Arc::new(Stores::new(clock.clone()));
        let gossip = self
            .gossip
            .unwrap_or_else(|| Arc::new(LocalGossip::new()));
        if !self.join_peers.is_empty() {
            gossip.set_resolvers(self.join_peers);
        }
        let db = self
            .db
            .unwrap_or_else(|| Arc::new(LocalKv::new(stores.clone())));
        let event_feed = self
            .event_feed
            .unwrap_or_else(|| Arc::new(EventFeed::with_capacity(config.event_feed_capacity)));
        let rpc = self.rpc.unwrap_or_else(|| Arc::new(RpcServer::new()));
        let sender: Arc<dyn Sender> = match self.sender {
            Some(sender) => sender,
            None => stores.clone(),
        };

        let env = Arc::new(Env::new(gossip, db, clock, event_feed, config));
        let stopper = Arc::new(Stopper::new());
        let (halt_tx, halt_rx) = halt_channel();

        let node = Node::start(
            env,
            stores,
            sender,
            stopper,
            halt_tx,
            &rpc,
            address,
            &engines,
            self.attrs,
        )
        .await?;

        Ok(NodeRuntime::new(node, rpc, halt_rx))
    }
}

#[cfg(feature = "memory-engine")]
fn default_engines() -> Result<Vec<Arc<dyn Engine>>, NodeError> {
    let engine: Arc<dyn Engine> = Arc::new(crate::store::memory_engine::InMemoryEngine::default());
    Ok(vec![engine])
}

#[cfg(not(feature = "memory-engine"))]
fn default_engines() -> Result<Vec<Arc<dyn Engine>>, NodeError> {
    Err(NodeError::ConfigurationError(
        "At least one engine is required".to_string(),
    ))
}
