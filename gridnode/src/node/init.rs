//! Startup sequence establishing a node's identity and its set of stores.

use log::{info, warn};
use std::sync::Arc;
use stdext::function_name;

use crate::env::Env;
use crate::halt::{FatalError, HaltSender};
use crate::idalloc::{allocate_node_id, allocate_store_ids};
use crate::keys::KEY_CLUSTER_ID;
use crate::kv::KvClient;
use crate::node::identity::NodeIdentity;
use crate::node::{Attributes, NodeAddress, NodeError, NodeId, StoreValidationError};
use crate::stop::Stopper;
use crate::store::{Engine, Store, StoreError, StoreId, StoreIdent, Stores};

/// Owns the node identity while the node starts. Once initialization is done
/// the identity is handed over, read-only, via [`NodeInit::into_identity`].
pub struct NodeInit {
    env: Arc<Env>,
    stores: Arc<Stores>,
    stopper: Arc<Stopper>,
    halt: HaltSender,
    identity: NodeIdentity,
}

impl NodeInit {
    pub fn new(
        env: Arc<Env>,
        stores: Arc<Stores>,
        stopper: Arc<Stopper>,
        halt: HaltSender,
        address: NodeAddress,
        attrs: Attributes,
    ) -> Self {
        NodeInit {
            env,
            stores,
            stopper,
            halt,
            identity: NodeIdentity::new(address, attrs),
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn into_identity(self) -> NodeIdentity {
        self.identity
    }

    /// Starts a store per engine and settles the node identity.
    ///
    /// Engines without an identity are bootstrapped in the background once
    /// the cluster and node IDs are known; this call does not wait for them.
    pub async fn init_stores(&mut self, engines: &[Arc<dyn Engine>]) -> Result<(), NodeError> {
        if engines.is_empty() {
            return Err(NodeError::NoEngines);
        }

        let mut pending = vec![];
        for engine in engines {
            let store = Arc::new(Store::new(
                self.env.store_context(),
                engine.clone(),
                self.identity.descriptor().clone(),
            ));
            match store.start(&self.stopper).await {
                Ok(()) => {}
                Err(StoreError::NotBootstrapped(_)) => {
                    info!("store {store} not bootstrapped");
                    pending.push(store);
                    continue;
                }
                Err(e) => return Err(NodeError::StoreStart(e)),
            }

            if !store.ident().is_complete() {
                return Err(NodeError::UnidentifiedStore(store.to_string()));
            }
            let capacity = store.capacity().await.map_err(NodeError::StoreCapacity)?;
            info!("initialized store {store}: {capacity:?}");
            self.stores
                .add_store(store)
                .map_err(NodeError::StoreStart)?;
        }

        if self.stores.get_store_count() == 0 {
            let resolvers = self.env.get_gossip().get_resolvers();
            match resolvers.as_slice() {
                [] => return Err(NodeError::NeedsBootstrap),
                [only] if only.address() == &self.identity.descriptor().address => {
                    return Err(NodeError::CannotJoinSelf);
                }
                _ => {}
            }
        }

        self.validate_stores().await?;

        self.env
            .get_gossip()
            .set_storage(self.stores.clone())
            .await
            .map_err(NodeError::GossipStorage)?;

        self.connect_gossip().await?;

        if self.identity.node_id().is_unset() {
            self.init_node_id(NodeId::default()).await?;
        }

        if !pending.is_empty() {
            self.schedule_store_bootstrap(pending);
        }
        Ok(())
    }

    /// Checks that every registered store agrees on cluster and node ID. The
    /// first store visited seeds the node identity.
    pub async fn validate_stores(&mut self) -> Result<(), NodeError> {
        for store in self.stores.snapshot() {
            let ident = store.ident();
            if self.identity.cluster_id().is_empty() {
                self.identity.set_cluster_id(&ident.cluster_id)?;
                self.init_node_id(ident.node_id).await?;
            } else if self.identity.cluster_id() != ident.cluster_id {
                return Err(StoreValidationError::ClusterIdMismatch {
                    store: ident.store_id,
                    expected: self.identity.cluster_id().to_string(),
                    found: ident.cluster_id,
                }
                .into());
            } else if self.identity.node_id() != ident.node_id {
                return Err(StoreValidationError::NodeIdMismatch {
                    store: ident.store_id,
                    expected: self.identity.node_id(),
                    found: ident.node_id,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Fixes the node ID. Zero allocates a new ID unless one is already set,
    /// in which case it is a no-op; a different non-zero ID is fatal. The
    /// descriptor is gossiped under the node-ID key afterwards.
    pub async fn init_node_id(&mut self, node_id: NodeId) -> Result<(), NodeError> {
        if node_id.value() < 0 {
            return Err(FatalError::NegativeNodeId(node_id).into());
        }

        let current = self.identity.node_id();
        if !current.is_unset() {
            if node_id.is_unset() || node_id == current {
                return Ok(());
            }
            return Err(FatalError::NodeIdConflict {
                current,
                requested: node_id,
            }
            .into());
        }

        let gossip = self.env.get_gossip().clone();
        let node_id = if node_id.is_unset() {
            let allocated = allocate_node_id(self.env.get_db().as_ref())
                .await
                .map_err(FatalError::NodeIdAllocation)?;
            info!("new node allocated ID {allocated}");
            if allocated.value() <= 0 {
                return Err(FatalError::IllegalNodeId.into());
            }
            allocated
        } else {
            info!("node ID {node_id} initialized");
            node_id
        };
        gossip.set_node_id(node_id);
        self.identity.set_node_id(node_id)?;

        gossip
            .set_node_descriptor(self.identity.descriptor())
            .await
            .map_err(|source| FatalError::GossipDescriptor { node_id, source })?;
        Ok(())
    }

    /// Waits for gossip connectivity, then adopts or verifies the cluster ID
    /// found on the gossip network. Blocks without timeout.
    pub async fn connect_gossip(&mut self) -> Result<(), FatalError> {
        info!("connecting to gossip network to verify cluster ID...");
        let gossip = self.env.get_gossip().clone();
        gossip.connected().await;

        let bytes = gossip
            .get_info(KEY_CLUSTER_ID)
            .map_err(FatalError::GossipClusterId)?;
        let gossip_cluster_id = String::from_utf8_lossy(&bytes).into_owned();

        if self.identity.cluster_id().is_empty() {
            self.identity.set_cluster_id(&gossip_cluster_id)?;
        } else if self.identity.cluster_id() != gossip_cluster_id {
            return Err(FatalError::ClusterIdMismatch {
                node_id: self.identity.node_id(),
                local: self.identity.cluster_id().to_string(),
                gossip: gossip_cluster_id,
            });
        }
        info!("node connected via gossip and verified as part of cluster {gossip_cluster_id:?}");
        Ok(())
    }

    fn schedule_store_bootstrap(&self, pending: Vec<Arc<Store>>) {
        let cluster_id = self.identity.cluster_id().to_string();
        let node_id = self.identity.node_id();
        let stores = self.stores.clone();
        let db = self.env.get_db().clone();
        let stopper = self.stopper.clone();
        let halt = self.halt.clone();
        let count = pending.len();

        let scheduled = self.stopper.run_async_task(async move {
            if let Err(e) =
                bootstrap_stores(pending, &cluster_id, node_id, &stores, db.as_ref(), &stopper)
                    .await
            {
                halt.halt(e);
            }
        });
        if !scheduled {
            warn!(
                "node={node_id}; {}; stopping, {count} store(s) left unbootstrapped",
                function_name!()
            );
        }
    }
}

/// Gives each pending store an identity with a freshly allocated store ID,
/// then starts, registers and gossips it. IDs are assigned in `pending` order.
pub async fn bootstrap_stores(
    pending: Vec<Arc<Store>>,
    cluster_id: &str,
    node_id: NodeId,
    stores: &Stores,
    db: &dyn KvClient,
    stopper: &Stopper,
) -> Result<(), FatalError> {
    if cluster_id.is_empty() {
        return Err(FatalError::MissingClusterId);
    }

    let first = allocate_store_ids(node_id, pending.len() as i64, db)
        .await
        .map_err(FatalError::StoreIdAllocation)?;
    let mut ident = StoreIdent {
        cluster_id: cluster_id.to_string(),
        node_id,
        store_id: first,
    };

    for store in pending {
        let store_id = ident.store_id;
        let fatal = |source| FatalError::StoreBootstrap { store_id, source };

        match store.bootstrap(ident.clone(), stopper).await {
            Ok(()) => {}
            Err(StoreError::Stopped(_)) => {
                info!("node={node_id}; stopping, abandoning bootstrap of store {store_id}");
                return Ok(());
            }
            Err(e) => return Err(fatal(e)),
        }
        store.start(stopper).await.map_err(fatal)?;
        stores.add_store(store.clone()).map_err(fatal)?;
        info!("node={node_id}; bootstrapped store {store}");

        ident.store_id = StoreId(store_id.value() + 1);

        // The periodic gossip loop covers this too; announcing now makes the
        // store usable sooner.
        if let Err(e) = store.gossip_store().await {
            warn!("node={node_id}; unable to gossip store {store}: {e}");
        }
    }
    Ok(())
}
