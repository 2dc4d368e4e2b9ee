//! Periodic background work of a running node.

use log::{error, info};
use std::sync::Arc;
use tokio::time::{Instant, interval, interval_at};

use crate::halt::FatalError;
use crate::node::Node;
use crate::store::StoreError;

impl Node {
    /// Gossips every store once right away, then every gossip interval.
    /// A store that cannot be gossiped halts the node.
    pub(crate) fn start_gossip(self: &Arc<Self>) {
        let node = self.clone();
        let mut stop = self.stopper.should_stop();
        let period = self.env.get_config().gossip_interval;

        self.stopper.run_worker(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = stop.stopped() => {
                        info!("node={}; Shutting down store gossip", node.node_id());
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = node.gossip_stores().await {
                            node.halt.halt(e);
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Publishes every store's status each publish interval. Failures are
    /// logged and retried on the next tick.
    pub(crate) fn start_publish_statuses(self: &Arc<Self>) {
        let node = self.clone();
        let mut stop = self.stopper.should_stop();
        let period = self.env.get_config().publish_status_interval;

        self.stopper.run_worker(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = stop.stopped() => {
                        info!("node={}; Shutting down status publisher", node.node_id());
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = node.publish_store_statuses().await {
                            error!("node={}; failed to publish store status: {e}", node.node_id());
                        }
                    }
                }
            }
        });
    }

    pub async fn gossip_stores(&self) -> Result<(), FatalError> {
        self.stores
            .visit_stores(|store| async move {
                store
                    .gossip_store()
                    .await
                    .map_err(|source| FatalError::GossipStore {
                        store_id: store.store_id(),
                        source,
                    })
            })
            .await
    }

    pub async fn publish_store_statuses(&self) -> Result<(), StoreError> {
        self.stores
            .visit_stores(|store| async move { store.publish_status().await })
            .await
    }
}
