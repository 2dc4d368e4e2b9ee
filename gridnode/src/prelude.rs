//! Convenient re-exports for common gridnode types.
//!
//! # Example
//!
//! ```
//! use gridnode::prelude::*;
//! ```

pub use std::sync::Arc;

pub use crate::batch::{BatchRequest, BatchResponse, Request, Response};
pub use crate::{
    AbortHandle, Engine, Node, NodeAddress, NodeBuilder, NodeError, NodeRuntime, Store, Stores,
};

#[cfg(feature = "memory-engine")]
pub use crate::InMemoryEngine;
