//! Unrecoverable invariant violations and the single point where they stop the process.
//!
//! Nothing below this module terminates the process directly. Synchronous code
//! returns [`FatalError`] wrapped in `NodeError::Fatal`; background workers
//! report it through a [`HaltSender`]. Only [`halt`] exits.

use log::error;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::batch::BatchError;
use crate::gossip::GossipError;
use crate::idalloc::AllocationError;
use crate::node::NodeId;
use crate::rpc::RpcError;
use crate::store::{StoreError, StoreId};

#[derive(Error, Debug)]
pub enum FatalError {
    #[error("NodeID must not be negative: {0}")]
    NegativeNodeId(NodeId),
    #[error("cannot initialize NodeID to {requested}, already have {current}")]
    NodeIdConflict { current: NodeId, requested: NodeId },
    #[error("new node allocated illegal ID 0")]
    IllegalNodeId,
    #[error("unable to allocate node ID: {0}")]
    NodeIdAllocation(#[source] AllocationError),
    #[error("couldn't gossip descriptor for node {node_id}: {source}")]
    GossipDescriptor {
        node_id: NodeId,
        #[source]
        source: GossipError,
    },
    #[error("unable to ascertain cluster ID from gossip network: {0}")]
    GossipClusterId(#[source] GossipError),
    #[error(
        "node {node_id} belongs to cluster {local:?} but is attempting to connect to a gossip network for cluster {gossip:?}"
    )]
    ClusterIdMismatch {
        node_id: NodeId,
        local: String,
        gossip: String,
    },
    #[error("cluster ID already set to {current:?}, refusing to overwrite with {requested:?}")]
    ClusterIdReassigned { current: String, requested: String },
    #[error("cluster ID missing during bootstrap of auxiliary stores")]
    MissingClusterId,
    #[error("unable to allocate store IDs: {0}")]
    StoreIdAllocation(#[source] AllocationError),
    #[error("failed to bootstrap store {store_id}: {source}")]
    StoreBootstrap {
        store_id: StoreId,
        #[source]
        source: StoreError,
    },
    #[error("error is unexpectedly set on the response from {stores}: {error}")]
    ErrorUnexpectedlySet { stores: String, error: BatchError },
    #[error("failed to gossip store {store_id}: {source}")]
    GossipStore {
        store_id: StoreId,
        #[source]
        source: StoreError,
    },
    #[error("unable to register node service with RPC server: {0}")]
    RpcRegistration(#[source] RpcError),
}

/// Reports fatal errors from background workers to the node runtime.
#[derive(Debug, Clone)]
pub struct HaltSender {
    tx: mpsc::UnboundedSender<FatalError>,
}

pub type HaltReceiver = mpsc::UnboundedReceiver<FatalError>;

pub fn halt_channel() -> (HaltSender, HaltReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HaltSender { tx }, rx)
}

impl HaltSender {
    pub fn halt(&self, err: FatalError) {
        error!("fatal: {err}");
        if let Err(e) = self.tx.send(err) {
            error!("halt receiver dropped, fatal error lost: {}", e.0);
        }
    }
}

/// Logs the fatal error and terminates the process.
pub fn halt(err: &FatalError) -> ! {
    error!("halting process: {err}");
    std::process::exit(1)
}
