//! In-process registry of RPC methods served by a node.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::BoxFuture;
use log::debug;
use std::sync::Arc;
use thiserror::Error;

use crate::batch::{BatchRequest, BatchResponse};
use crate::node::NodeError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("method {0:?} is already registered")]
    DuplicateMethod(String),
    #[error("unknown method {0:?}")]
    UnknownMethod(String),
}

pub type RpcHandler =
    Arc<dyn Fn(BatchRequest) -> BoxFuture<'static, Result<BatchResponse, NodeError>> + Send + Sync>;

#[derive(Default)]
pub struct RpcServer {
    methods: DashMap<String, RpcHandler>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `method`. Each method can be registered once.
    pub fn register(&self, method: &str, handler: RpcHandler) -> Result<(), RpcError> {
        match self.methods.entry(method.to_string()) {
            Entry::Occupied(_) => Err(RpcError::DuplicateMethod(method.to_string())),
            Entry::Vacant(entry) => {
                debug!("rpc: registered method {method}");
                entry.insert(handler);
                Ok(())
            }
        }
    }

    pub fn is_registered(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub async fn call(&self, method: &str, request: BatchRequest) -> Result<BatchResponse, NodeError> {
        // Clone the handler out so no map guard is held across the await.
        let handler = self
            .methods
            .get(method)
            .map(|h| h.value().clone())
            .ok_or_else(|| RpcError::UnknownMethod(method.to_string()))?;
        handler(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn echo_handler() -> RpcHandler {
        Arc::new(|_request: BatchRequest| async { Ok(BatchResponse::default()) }.boxed())
    }

    #[tokio::test]
    async fn call_registered_method() {
        let server = RpcServer::new();
        server.register("Node.Batch", echo_handler()).unwrap();
        assert!(server.is_registered("Node.Batch"));

        let response = server.call("Node.Batch", BatchRequest::new()).await.unwrap();
        assert_eq!(response, BatchResponse::default());
    }

    #[tokio::test]
    async fn unknown_and_duplicate_methods() {
        let server = RpcServer::new();
        server.register("Node.Batch", echo_handler()).unwrap();
        assert_eq!(
            server.register("Node.Batch", echo_handler()),
            Err(RpcError::DuplicateMethod("Node.Batch".to_string()))
        );
        assert!(matches!(
            server.call("Node.Missing", BatchRequest::new()).await,
            Err(NodeError::Rpc(RpcError::UnknownMethod(_)))
        ));
    }
}
