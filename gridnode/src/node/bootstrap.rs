//! Seeding a brand-new cluster from a set of empty engines.

use log::info;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::event_feed::EventFeed;
use crate::gossip::LocalGossip;
use crate::idalloc::{AllocationError, allocate_node_id, allocate_store_ids};
use crate::kv::LocalKv;
use crate::node::{NodeDescriptor, NodeId};
use crate::schema::{SchemaError, bootstrap_schema};
use crate::stop::Stopper;
use crate::store::{Engine, Store, StoreContext, StoreError, StoreId, StoreIdent, Stores};

const BOOTSTRAP_NODE_ID: NodeId = NodeId(1);

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("no engines to bootstrap")]
    NoEngines,
    #[error("storage engine already belongs to a cluster ({0})")]
    AlreadyBootstrapped(String),
    #[error("failed to bootstrap store {store_id}: {source}")]
    Store {
        store_id: StoreId,
        #[source]
        source: StoreError,
    },
    #[error("failed to build bootstrap schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("expected to initialize node id allocator to {expected}, got {got}")]
    NodeIdMismatch { expected: NodeId, got: NodeId },
    #[error("expected to initialize store id allocator to {expected}, got {got}")]
    StoreIdMismatch { expected: StoreId, got: StoreId },
    #[error("ID allocation failed during bootstrap: {0}")]
    Allocation(#[from] AllocationError),
}

/// Bootstraps `engines` as the only stores of a new cluster and returns the
/// generated cluster ID.
///
/// Every store gets node ID 1 and store IDs 1..=N in engine order. The first
/// store also receives the range spanning all keys, seeded with the bootstrap
/// schema. Uses a private store registry, clock and key/value sender, so no
/// running node is needed. Writes are not rolled back on failure.
pub async fn bootstrap_cluster(engines: &[Arc<dyn Engine>]) -> Result<String, BootstrapError> {
    if engines.is_empty() {
        return Err(BootstrapError::NoEngines);
    }

    let cluster_id = Uuid::new_v4().to_string();
    let stopper = Stopper::new();
    let clock = Arc::new(Clock::default());
    let stores = Arc::new(Stores::new(clock.clone()));
    let ctx = StoreContext {
        gossip: Arc::new(LocalGossip::new()),
        clock,
        event_feed: Arc::new(EventFeed::new()),
    };

    let result = bootstrap_engines(&cluster_id, engines, ctx, stores, &stopper).await;

    stopper.stop();
    stopper.wait().await;

    result.map(|()| cluster_id)
}

async fn bootstrap_engines(
    cluster_id: &str,
    engines: &[Arc<dyn Engine>],
    ctx: StoreContext,
    stores: Arc<Stores>,
    stopper: &Stopper,
) -> Result<(), BootstrapError> {
    let db = LocalKv::new(stores.clone());
    let descriptor = NodeDescriptor {
        node_id: BOOTSTRAP_NODE_ID,
        ..Default::default()
    };

    for (i, engine) in engines.iter().enumerate() {
        let ident = StoreIdent {
            cluster_id: cluster_id.to_string(),
            node_id: BOOTSTRAP_NODE_ID,
            store_id: StoreId(i as i32 + 1),
        };
        let store_id = ident.store_id;
        let store_err = |source| BootstrapError::Store { store_id, source };

        let store = Arc::new(Store::new(ctx.clone(), engine.clone(), descriptor.clone()));

        if let Some(existing) = store.read_ident().await.map_err(store_err)?
            && !existing.cluster_id.is_empty()
        {
            return Err(BootstrapError::AlreadyBootstrapped(existing.cluster_id));
        }

        store
            .bootstrap(ident, stopper)
            .await
            .map_err(store_err)?;

        if i == 0 {
            let initial_values = bootstrap_schema()?.initial_values()?;
            store
                .bootstrap_range(&initial_values)
                .await
                .map_err(store_err)?;
        }

        store.start(stopper).await.map_err(store_err)?;
        stores.add_store(store).map_err(store_err)?;

        if i == 0 {
            let node_id = allocate_node_id(&db).await?;
            if node_id != BOOTSTRAP_NODE_ID {
                return Err(BootstrapError::NodeIdMismatch {
                    expected: BOOTSTRAP_NODE_ID,
                    got: node_id,
                });
            }
        }

        let allocated = allocate_store_ids(BOOTSTRAP_NODE_ID, 1, &db).await?;
        if allocated != store_id {
            return Err(BootstrapError::StoreIdMismatch {
                expected: store_id,
                got: allocated,
            });
        }
        info!("bootstrap: store {store_id} of cluster {cluster_id} initialized");
    }
    Ok(())
}
