//! Gridnode - node bootstrap and membership core of a range-partitioned
//! key/value cluster.
//!
//! A node starts its storage engines, seeds a new cluster or joins an existing
//! one, settles a cluster-wide identity (cluster ID, node ID, one store ID per
//! engine) and then serves batched commands against its stores.
//!
//! # Quick Start
//!
//! ```no_run
//! use gridnode::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Seed a cluster from two in-memory engines
//!     let node = NodeBuilder::new()
//!         .address("127.0.0.1:26257")?
//!         .engine(Arc::new(InMemoryEngine::new("mem-0", 64 << 20)))
//!         .engine(Arc::new(InMemoryEngine::new("mem-1", 64 << 20)))
//!         .build()
//!         .await?;
//!
//!     // Graceful shutdown on Ctrl+C
//!     let abort_handle = node.abort_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         abort_handle.abort();
//!     });
//!
//!     node.wait().await?;
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod clock;
#[doc(hidden)]
pub mod env;
pub mod event_feed;
pub mod gossip;
pub mod halt;
pub mod idalloc;
pub mod keys;
pub mod kv;
pub mod node;
pub mod prelude;
pub mod rpc;
pub mod schema;
pub mod stop;
pub mod store;
pub mod trace;

pub use halt::FatalError;
pub use node::{AbortHandle, Node, NodeAddress, NodeBuilder, NodeError, NodeRuntime};
#[cfg(feature = "memory-engine")]
pub use store::memory_engine::InMemoryEngine;
pub use store::{Engine, EngineError, Store, StoreError, Stores};

/// Unified error type for gridnode operations.
///
/// This enum wraps all public error types for easier error handling with the `?` operator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Allocation(#[from] idalloc::AllocationError),
    #[error(transparent)]
    Bootstrap(#[from] node::BootstrapError),
}

/// Convenient Result type alias using the unified [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
