mod address;
mod bootstrap;
mod builder;
mod dispatch;
mod identity;
mod init;
mod types;
mod workers;

pub use address::{NodeAddress, NodeAddressParseError};
pub use bootstrap::{BootstrapError, bootstrap_cluster};
pub use builder::NodeBuilder;
pub use dispatch::BATCH_METHOD;
pub use identity::NodeIdentity;
pub use init::{NodeInit, bootstrap_stores};
pub use types::{
    Attributes, NodeConfig, NodeDescriptor, NodeError, NodeId, StoreValidationError,
};

use log::info;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::batch::Sender;
use crate::env::Env;
use crate::event_feed::NodeEventFeed;
use crate::gossip::Resolver;
use crate::halt::{FatalError, HaltReceiver, HaltSender, halt};
use crate::rpc::RpcServer;
use crate::stop::Stopper;
use crate::store::{Engine, Stores};

/// A started node: its settled identity, its stores and the background work
/// serving them.
pub struct Node {
    env: Arc<Env>,
    stores: Arc<Stores>,
    sender: Arc<dyn Sender>,
    stopper: Arc<Stopper>,
    halt: HaltSender,
    identity: NodeIdentity,
    feed: NodeEventFeed,
}

impl Node {
    /// Starts a node over `engines`.
    ///
    /// A node with no bootstrapped engine and nobody to join seeds a new
    /// cluster from its engines and joins itself. Background loops start once
    /// identity and stores are settled; the batch RPC method is registered
    /// last. Batches are executed through `sender`, normally `stores`
    /// itself.
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        env: Arc<Env>,
        stores: Arc<Stores>,
        sender: Arc<dyn Sender>,
        stopper: Arc<Stopper>,
        halt: HaltSender,
        rpc: &RpcServer,
        addr: NodeAddress,
        engines: &[Arc<dyn Engine>],
        attrs: Attributes,
    ) -> Result<Arc<Node>, NodeError> {
        let mut init = NodeInit::new(
            env.clone(),
            stores.clone(),
            stopper.clone(),
            halt.clone(),
            addr.clone(),
            attrs,
        );

        match init.init_stores(engines).await {
            Ok(()) => {}
            Err(NodeError::NeedsBootstrap) => {
                let cluster_id = bootstrap_cluster(engines).await?;
                info!("**** cluster {cluster_id} has been created");
                info!("**** add additional nodes by joining {addr}");
                env.get_gossip()
                    .set_resolvers(vec![Resolver::from_address(addr.clone())]);
                init.init_stores(engines).await?;
            }
            Err(e) => return Err(e),
        }

        let mut identity = init.into_identity();
        identity.set_started_at(env.get_clock().now().timestamp);

        // Store events emitted during initialization precede this one.
        let feed = NodeEventFeed::new(identity.node_id(), env.get_event_feed().clone());
        feed.start_node(identity.descriptor().clone(), identity.started_at());

        let node = Arc::new(Node {
            env,
            stores,
            sender,
            stopper,
            halt,
            identity,
            feed,
        });

        node.start_publish_statuses();
        node.start_gossip();

        if let Err(e) = node.register_rpc(rpc) {
            node.stop().await;
            return Err(FatalError::RpcRegistration(e).into());
        }

        info!(
            "node={}; Started node with {} engine(s) and attributes [{}]",
            node.node_id(),
            engines.len(),
            node.identity.descriptor().attrs
        );
        Ok(node)
    }

    pub fn node_id(&self) -> NodeId {
        self.identity.node_id()
    }

    pub fn cluster_id(&self) -> &str {
        self.identity.cluster_id()
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn stores(&self) -> &Arc<Stores> {
        &self.stores
    }

    pub fn env(&self) -> &Arc<Env> {
        &self.env
    }

    pub fn is_stopping(&self) -> bool {
        self.stopper.is_stopping()
    }

    /// Refuses new commands, stops background loops and waits for in-flight
    /// work to finish.
    pub async fn stop(&self) {
        info!("node={}; stopping", self.node_id());
        self.stopper.stop();
        self.stopper.wait().await;
    }
}

/// Handle that can be used to abort a running node.
/// This handle is cloneable and can be passed to other tasks.
#[derive(Clone)]
pub struct AbortHandle {
    shutdown_tx: broadcast::Sender<()>,
}

impl AbortHandle {
    /// Signals the node to shutdown.
    pub fn abort(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Handle to a running node.
/// Allows for programmatic shutdown and waiting for the node to stop.
pub struct NodeRuntime {
    node: Arc<Node>,
    rpc: Arc<RpcServer>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
    halt_rx: HaltReceiver,
}

impl NodeRuntime {
    pub(crate) fn new(node: Arc<Node>, rpc: Arc<RpcServer>, halt_rx: HaltReceiver) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        NodeRuntime {
            node,
            rpc,
            shutdown_tx,
            shutdown_rx,
            halt_rx,
        }
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// RPC server the node registered its methods with.
    pub fn rpc(&self) -> &Arc<RpcServer> {
        &self.rpc
    }

    /// Returns an AbortHandle that can be used to signal shutdown.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    /// Signals the node to shutdown.
    pub fn abort(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Waits until the node is aborted or a background task reports a fatal
    /// error, then stops the node. A fatal error is returned as
    /// [`NodeError::Fatal`].
    pub async fn wait(mut self) -> Result<(), NodeError> {
        let result = tokio::select! {
            _ = self.shutdown_rx.recv() => Ok(()),
            fatal = self.halt_rx.recv() => match fatal {
                Some(err) => Err(NodeError::Fatal(err)),
                None => Ok(()),
            },
        };
        self.node.stop().await;
        result
    }

    /// Runs the node until Ctrl+C is received, then performs graceful shutdown.
    ///
    /// A fatal error terminates the process through [`halt`].
    pub async fn run_until_shutdown(self) -> Result<(), NodeError> {
        let abort_handle = self.abort_handle();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            abort_handle.abort();
        });
        match self.wait().await {
            Err(NodeError::Fatal(err)) => halt(&err),
            other => other,
        }
    }
}
