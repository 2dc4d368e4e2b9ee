use log::debug;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;

use crate::batch::{BatchError, BatchRequest, BatchResponse, Sender};
use crate::halt::FatalError;
use crate::node::{Node, NodeError};
use crate::rpc::{RpcError, RpcServer};
use crate::trace::{Span, encode_raw_span};

/// RPC method under which a node serves batch commands.
pub const BATCH_METHOD: &str = "Node.Batch";

impl Node {
    /// Executes a batch against the local stores.
    ///
    /// Refused with [`NodeError::NodeStopped`] once the node is stopping,
    /// before anything about the batch is looked at. A routing error is
    /// returned inside the response, never alongside a partially filled one.
    pub async fn execute_cmd(&self, ba: BatchRequest) -> Result<BatchResponse, NodeError> {
        match self.stopper.run_task(|| self.traced_dispatch(&ba)).await {
            Some(result) => result,
            None => Err(NodeError::NodeStopped(self.node_id())),
        }
    }

    async fn traced_dispatch(&self, ba: &BatchRequest) -> Result<BatchResponse, NodeError> {
        let mut span = match &ba.trace {
            Some(trace) => self.env.get_tracer().join_trace_from_binary("node", trace)?,
            None => Span::Noop,
        };

        let mut br = self.dispatch(ba, &mut span).await?;

        if let Some(raw) = span.finish() {
            br.collected_spans.push(encode_raw_span(&raw)?);
        }
        Ok(br)
    }

    async fn dispatch(&self, ba: &BatchRequest, span: &mut Span) -> Result<BatchResponse, NodeError> {
        span.log_event(format!("node {}", self.node_id()));

        let started = Instant::now();
        let (mut br, error) = match self.sender.send(ba).await {
            Ok(br) => (br, None),
            Err(e) => {
                span.log_event(format!("error: {}", e.detail.name()));
                (BatchResponse::default(), Some(e))
            }
        };

        if let Some(embedded) = br.error.take() {
            self.halt.halt(self.error_unexpectedly_set(embedded.clone()));
            return Err(self.error_unexpectedly_set(embedded).into());
        }

        let duration = started.elapsed();
        debug!("node={}; executed {ba} in {duration:?}", self.node_id());
        self.feed.call_complete(ba.clone(), duration, error.clone());
        br.error = error;
        Ok(br)
    }

    fn error_unexpectedly_set(&self, error: BatchError) -> FatalError {
        let ids: Vec<String> = self
            .stores
            .snapshot()
            .iter()
            .map(|s| s.store_id().to_string())
            .collect();
        FatalError::ErrorUnexpectedlySet {
            stores: format!("stores [{}]", ids.join(", ")),
            error,
        }
    }

    /// Exposes [`Node::execute_cmd`] as [`BATCH_METHOD`].
    pub(crate) fn register_rpc(self: &Arc<Self>, rpc: &RpcServer) -> Result<(), RpcError> {
        let node = self.clone();
        rpc.register(
            BATCH_METHOD,
            Arc::new(move |ba: BatchRequest| {
                let node = node.clone();
                async move { node.execute_cmd(ba).await }.boxed()
            }),
        )
    }
}
