use std::sync::Arc;
use std::time::Duration;

use log::error;
use stdext::function_name;
use tokio::sync::mpsc;

use crate::batch::{BatchError, BatchRequest};
use crate::node::{NodeDescriptor, NodeId};
use crate::store::StoreStatus;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StartNode {
        descriptor: NodeDescriptor,
        started_at: u64,
    },
    CallComplete {
        node_id: NodeId,
        request: BatchRequest,
        duration: Duration,
        error: Option<BatchError>,
    },
    StoreStatus(StoreStatus),
}

/// Internal feed of node and store events.
///
/// Publishing never blocks; events are dropped (and logged) when the
/// consumer falls behind.
#[derive(Debug)]
pub struct EventFeed {
    pub tx: mpsc::Sender<Event>,
    pub rx: std::sync::Mutex<Option<mpsc::Receiver<Event>>>,
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Event>(capacity);
        Self {
            tx,
            rx: std::sync::Mutex::new(Some(rx)),
        }
    }

    pub fn take_receiver(&self) -> Option<mpsc::Receiver<Event>> {
        self.rx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn emit(&self, ev: Event) {
        if let Err(e) = self.tx.try_send(ev) {
            error!("{}; Failed to emit event: {e}", function_name!());
        }
    }
}

/// Publishes events on behalf of one node.
#[derive(Debug, Clone)]
pub struct NodeEventFeed {
    node_id: NodeId,
    feed: Arc<EventFeed>,
}

impl NodeEventFeed {
    pub fn new(node_id: NodeId, feed: Arc<EventFeed>) -> Self {
        NodeEventFeed { node_id, feed }
    }

    pub fn start_node(&self, descriptor: NodeDescriptor, started_at: u64) {
        self.feed.emit(Event::StartNode {
            descriptor,
            started_at,
        });
    }

    pub fn call_complete(&self, request: BatchRequest, duration: Duration, error: Option<BatchError>) {
        self.feed.emit(Event::CallComplete {
            node_id: self.node_id,
            request,
            duration,
            error,
        });
    }
}
