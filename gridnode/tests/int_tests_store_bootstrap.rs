mod helpers;

use gridnode::gossip::{Gossip, LocalGossip};
use gridnode::halt::FatalError;
use gridnode::keys::STORE_ID_GENERATOR;
use gridnode::node::{NodeDescriptor, NodeId, bootstrap_stores};
use gridnode::store::{Engine, Store, StoreId};
use helpers::{CountingKv, TestNode, mem_engines, read_ident};
use std::sync::Arc;

fn pending_stores(node: &TestNode, engines: &[Arc<dyn Engine>]) -> Vec<Arc<Store>> {
    engines
        .iter()
        .map(|e| {
            Arc::new(Store::new(
                node.env.store_context(),
                e.clone(),
                NodeDescriptor::default(),
            ))
        })
        .collect()
}

#[tokio::test]
async fn test_pending_stores_get_consecutive_ids() {
    let _ = env_logger::try_init();

    let engines = mem_engines(3);
    let node = TestNode::new(Arc::new(LocalGossip::new()), None);
    let pending = pending_stores(&node, &engines);
    let kv = CountingKv::with_counter(STORE_ID_GENERATOR, 9);

    bootstrap_stores(pending, "c1", NodeId(5), &node.stores, &kv, &node.stopper)
        .await
        .unwrap();

    for (engine, expected) in engines.iter().zip([10, 11, 12]) {
        let ident = read_ident(engine).await.unwrap();
        assert_eq!(ident.cluster_id, "c1");
        assert_eq!(ident.node_id, NodeId(5));
        assert_eq!(ident.store_id, StoreId(expected));
        assert!(node.stores.has_store(StoreId(expected)));
        assert!(
            node.gossip
                .get_info(&format!("store:{expected}"))
                .is_ok()
        );
    }
    // one allocation covers the whole batch
    assert_eq!(kv.calls(), 1);

    node.shutdown().await;
}

#[tokio::test]
async fn test_missing_cluster_id_is_fatal() {
    let engines = mem_engines(1);
    let node = TestNode::new(Arc::new(LocalGossip::new()), None);
    let pending = pending_stores(&node, &engines);
    let kv = CountingKv::default();

    let result = bootstrap_stores(pending, "", NodeId(5), &node.stores, &kv, &node.stopper).await;

    assert!(matches!(result, Err(FatalError::MissingClusterId)));
    assert_eq!(kv.calls(), 0);
    assert!(read_ident(&engines[0]).await.is_none());
}

#[tokio::test]
async fn test_stopping_abandons_remaining_stores() {
    let engines = mem_engines(2);
    let node = TestNode::new(Arc::new(LocalGossip::new()), None);
    let pending = pending_stores(&node, &engines);
    let kv = CountingKv::default();

    node.shutdown().await;
    bootstrap_stores(pending, "c1", NodeId(2), &node.stores, &kv, &node.stopper)
        .await
        .unwrap();

    assert_eq!(node.stores.get_store_count(), 0);
    assert!(read_ident(&engines[0]).await.is_none());
    assert!(read_ident(&engines[1]).await.is_none());
}
