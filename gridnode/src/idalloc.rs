//! Cluster-wide unique ID allocation on top of counter keys.
//!
//! IDs come from atomically incrementing a well-known counter and are never
//! reused. Failures are returned as-is; nothing here retries.

use log::info;
use thiserror::Error;

use crate::keys::{NODE_ID_GENERATOR, STORE_ID_GENERATOR};
use crate::kv::{KvClient, KvError};
use crate::node::NodeId;
use crate::store::StoreId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("increment of node ID counter failed: {0}")]
    NodeId(#[source] KvError),
    #[error("unable to allocate {count} store IDs for node {node_id}: {source}")]
    StoreIds {
        node_id: NodeId,
        count: i64,
        #[source]
        source: KvError,
    },
    #[error("allocated ID {0} does not fit a 32-bit identifier")]
    OutOfRange(i64),
}

/// Allocates a fresh node ID.
pub async fn allocate_node_id(db: &dyn KvClient) -> Result<NodeId, AllocationError> {
    let value = db
        .increment(NODE_ID_GENERATOR, 1)
        .await
        .map_err(AllocationError::NodeId)?;
    let node_id = i32::try_from(value).map_err(|_| AllocationError::OutOfRange(value))?;
    Ok(NodeId(node_id))
}

/// Reserves `count` consecutive store IDs for `node_id` and returns the
/// first one; the reserved range is `[first, first + count)`.
pub async fn allocate_store_ids(
    node_id: NodeId,
    count: i64,
    db: &dyn KvClient,
) -> Result<StoreId, AllocationError> {
    let value = db
        .increment(STORE_ID_GENERATOR, count)
        .await
        .map_err(|source| AllocationError::StoreIds {
            node_id,
            count,
            source,
        })?;
    let first = value - count + 1;
    let first = i32::try_from(first).map_err(|_| AllocationError::OutOfRange(first))?;
    info!("node={node_id}; allocated {count} store ID(s) starting at {first}");
    Ok(StoreId(first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counters {
        values: Mutex<HashMap<Vec<u8>, i64>>,
        broken: bool,
    }

    #[async_trait]
    impl KvClient for Counters {
        async fn increment(&self, key: &[u8], delta: i64) -> Result<i64, KvError> {
            if self.broken {
                return Err(KvError::Unavailable("no route".to_string()));
            }
            let mut values = self.values.lock().unwrap();
            let value = values.entry(key.to_vec()).or_default();
            *value += delta;
            Ok(*value)
        }
    }

    #[tokio::test]
    async fn node_ids_are_sequential() {
        let db = Counters::default();
        assert_eq!(allocate_node_id(&db).await.unwrap(), NodeId(1));
        assert_eq!(allocate_node_id(&db).await.unwrap(), NodeId(2));
    }

    #[tokio::test]
    async fn store_id_ranges_do_not_overlap() {
        let db = Counters::default();
        let first = allocate_store_ids(NodeId(1), 3, &db).await.unwrap();
        assert_eq!(first, StoreId(1));
        let next = allocate_store_ids(NodeId(2), 2, &db).await.unwrap();
        assert_eq!(next, StoreId(first.value() + 3));
        let last = allocate_store_ids(NodeId(2), 1, &db).await.unwrap();
        assert_eq!(last, StoreId(6));
    }

    #[tokio::test]
    async fn node_and_store_counters_are_independent() {
        let db = Counters::default();
        allocate_store_ids(NodeId(1), 4, &db).await.unwrap();
        assert_eq!(allocate_node_id(&db).await.unwrap(), NodeId(1));
    }

    #[tokio::test]
    async fn increment_failure_is_reported() {
        let db = Counters {
            broken: true,
            ..Default::default()
        };
        assert!(matches!(
            allocate_node_id(&db).await,
            Err(AllocationError::NodeId(KvError::Unavailable(_)))
        ));
        let err = allocate_store_ids(NodeId(5), 2, &db).await.unwrap_err();
        assert!(err.to_string().contains("2 store IDs for node 5"));
    }

    #[tokio::test]
    async fn oversized_counter_is_rejected() {
        let db = Counters::default();
        db.values
            .lock()
            .unwrap()
            .insert(NODE_ID_GENERATOR.to_vec(), i64::from(i32::MAX));
        assert_eq!(
            allocate_node_id(&db).await,
            Err(AllocationError::OutOfRange(i64::from(i32::MAX) + 1))
        );
    }
}
