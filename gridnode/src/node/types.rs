use crate::gossip::GossipError;
use crate::halt::FatalError;
use crate::node::NodeAddress;
use crate::node::bootstrap::BootstrapError;
use crate::rpc::RpcError;
use crate::store::{StoreError, StoreId};
use crate::trace::TraceError;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::time::Duration;
use thiserror::Error;

/// Cluster-wide node identifier. Zero means "not yet assigned".
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
pub struct NodeId(pub i32);

impl NodeId {
    pub fn value(self) -> i32 {
        self.0
    }

    pub fn is_unset(self) -> bool {
        self.0 == 0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for NodeId {
    fn from(value: i32) -> Self {
        NodeId(value)
    }
}

/// Opaque tags describing a node or store (e.g. "ssd", "us-east").
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Attributes(pub Vec<String>);

impl Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(":"))
    }
}

/// What the cluster knows about a node: its ID, address and attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub node_id: NodeId,
    pub address: NodeAddress,
    pub attrs: Attributes,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreValidationError {
    #[error("store {store} cluster ID {found:?} doesn't match node cluster {expected:?}")]
    ClusterIdMismatch {
        store: StoreId,
        expected: String,
        found: String,
    },
    #[error("store {store} node ID {found} doesn't match node ID: {expected}")]
    NodeIdMismatch {
        store: StoreId,
        expected: NodeId,
        found: NodeId,
    },
}

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("no engines")]
    NoEngines,
    #[error("node has no initialized stores and no instructions for joining an existing cluster")]
    NeedsBootstrap,
    #[error("an uninitialized node cannot specify its own address to join a cluster")]
    CannotJoinSelf,
    #[error("failed to start store: {0}")]
    StoreStart(#[source] StoreError),
    #[error("unidentified store: {0}")]
    UnidentifiedStore(String),
    #[error("could not query store capacity: {0}")]
    StoreCapacity(#[source] StoreError),
    #[error(transparent)]
    StoreValidation(#[from] StoreValidationError),
    #[error("failed to initialize the gossip interface: {0}")]
    GossipStorage(#[source] GossipError),
    #[error("Error bootstrapping cluster: {0}")]
    Bootstrap(#[from] BootstrapError),
    #[error("node {0} stopped")]
    NodeStopped(NodeId),
    #[error("cannot unmarshal trace: {0}")]
    Trace(#[from] TraceError),
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Fatal: {0}")]
    Fatal(#[from] FatalError),
}

const DEFAULT_GOSSIP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_PUBLISH_STATUS_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_EVENT_FEED_CAPACITY: usize = 1024;

const ENV_GOSSIP_INTERVAL_MS: &str = "GRIDNODE_GOSSIP_INTERVAL_MS";
const ENV_PUBLISH_STATUS_INTERVAL_MS: &str = "GRIDNODE_PUBLISH_STATUS_INTERVAL_MS";
const ENV_EVENT_FEED_CAPACITY: &str = "GRIDNODE_EVENT_FEED_CAPACITY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// How often every store re-announces itself on gossip.
    pub gossip_interval: Duration,
    /// How often every store publishes its status to the event feed.
    pub publish_status_interval: Duration,
    pub event_feed_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            gossip_interval: DEFAULT_GOSSIP_INTERVAL,
            publish_status_interval: DEFAULT_PUBLISH_STATUS_INTERVAL,
            event_feed_capacity: DEFAULT_EVENT_FEED_CAPACITY,
        }
    }
}

impl NodeConfig {
    /// Defaults overlaid with `GRIDNODE_*` environment variables.
    pub fn from_env() -> Result<Self, NodeError> {
        let mut config = NodeConfig::default();
        if let Some(ms) = read_env::<u64>(ENV_GOSSIP_INTERVAL_MS)? {
            config.gossip_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = read_env::<u64>(ENV_PUBLISH_STATUS_INTERVAL_MS)? {
            config.publish_status_interval = Duration::from_millis(ms);
        }
        if let Some(capacity) = read_env::<usize>(ENV_EVENT_FEED_CAPACITY)? {
            config.event_feed_capacity = capacity;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.gossip_interval.is_zero() || self.publish_status_interval.is_zero() {
            return Err(NodeError::ConfigurationError(
                "intervals must be greater than zero".to_string(),
            ));
        }
        if self.event_feed_capacity == 0 {
            return Err(NodeError::ConfigurationError(
                "event feed capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, NodeError>
where
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| NodeError::ConfigurationError(format!("invalid {name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
