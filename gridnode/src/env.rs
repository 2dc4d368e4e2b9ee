use std::sync::Arc;

use crate::clock::Clock;
use crate::event_feed::EventFeed;
use crate::gossip::Gossip;
use crate::kv::KvClient;
use crate::node::NodeConfig;
use crate::store::StoreContext;
use crate::trace::Tracer;

/// Collaborators a node and its stores share.
pub struct Env {
    gossip: Arc<dyn Gossip>,
    db: Arc<dyn KvClient>,
    clock: Arc<Clock>,
    event_feed: Arc<EventFeed>,
    tracer: Tracer,
    config: NodeConfig,
}

impl Env {
    pub fn new(
        gossip: Arc<dyn Gossip>,
        db: Arc<dyn KvClient>,
        clock: Arc<Clock>,
        event_feed: Arc<EventFeed>,
        config: NodeConfig,
    ) -> Self {
        Env {
            gossip,
            db,
            clock,
            event_feed,
            tracer: Tracer,
            config,
        }
    }

    pub fn get_gossip(&self) -> &Arc<dyn Gossip> {
        &self.gossip
    }

    /// Client used for ID allocation.
    pub fn get_db(&self) -> &Arc<dyn KvClient> {
        &self.db
    }

    pub fn get_clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    pub fn get_event_feed(&self) -> &Arc<EventFeed> {
        &self.event_feed
    }

    pub fn get_tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn get_config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store_context(&self) -> StoreContext {
        StoreContext {
            gossip: self.gossip.clone(),
            clock: self.clock.clone(),
            event_feed: self.event_feed.clone(),
        }
    }
}
