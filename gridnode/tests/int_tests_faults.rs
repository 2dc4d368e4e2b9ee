mod helpers;

use async_trait::async_trait;
use futures::FutureExt;
use gridnode::batch::{BatchError, BatchRequest, BatchResponse, ErrorDetail, Request, Sender};
use gridnode::event_feed::{Event, EventFeed};
use gridnode::halt::FatalError;
use gridnode::node::{BATCH_METHOD, NodeBuilder, NodeConfig, NodeError};
use gridnode::rpc::RpcServer;
use gridnode::store::StoreId;
use helpers::{FlakyEngine, FlakyGossip, quiet_config};
use std::sync::Arc;
use std::time::Duration;

/// Answers every batch with a response that wrongly carries an error.
struct EmbeddedErrorSender;

#[async_trait]
impl Sender for EmbeddedErrorSender {
    async fn send(&self, _ba: &BatchRequest) -> Result<BatchResponse, BatchError> {
        Ok(BatchResponse {
            error: Some(BatchError::new(ErrorDetail::Engine, "stray error")),
            ..Default::default()
        })
    }
}

fn get(key: &[u8]) -> BatchRequest {
    BatchRequest::new().with_request(Request::Get { key: key.to_vec() })
}

#[tokio::test]
async fn test_response_with_embedded_error_halts_node() {
    let _ = env_logger::try_init();

    let feed = Arc::new(EventFeed::new());
    let mut rx = feed.take_receiver().unwrap();
    let runtime = NodeBuilder::new()
        .address("127.0.0.1:26270")
        .unwrap()
        .config(quiet_config())
        .event_feed(feed)
        .sender(Arc::new(EmbeddedErrorSender))
        .build()
        .await
        .unwrap();
    let node = runtime.node().clone();

    match node.execute_cmd(get(b"a")).await {
        Err(NodeError::Fatal(FatalError::ErrorUnexpectedlySet { stores, error })) => {
            assert_eq!(stores, "stores [1]");
            assert_eq!(error.message, "stray error");
        }
        other => panic!("unexpected result {other:?}"),
    }

    match tokio::time::timeout(Duration::from_secs(5), runtime.wait())
        .await
        .unwrap()
    {
        Err(NodeError::Fatal(FatalError::ErrorUnexpectedlySet { .. })) => {}
        other => panic!("unexpected result {other:?}"),
    }
    assert!(node.is_stopping());

    // the failed call is not reported as complete
    assert!(matches!(rx.try_recv(), Ok(Event::StartNode { .. })));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_status_publish_keeps_loop_running() {
    let _ = env_logger::try_init();

    let engine = Arc::new(FlakyEngine::new("flaky"));
    let feed = Arc::new(EventFeed::new());
    let mut rx = feed.take_receiver().unwrap();
    let runtime = NodeBuilder::new()
        .address("127.0.0.1:26271")
        .unwrap()
        .config(NodeConfig {
            gossip_interval: Duration::from_secs(3600),
            publish_status_interval: Duration::from_millis(20),
            event_feed_capacity: 1024,
        })
        .engine(engine.clone())
        .event_feed(feed)
        .build()
        .await
        .unwrap();

    engine.fail_capacity(true);
    // let publishes that began before the failure finish, then forget them
    tokio::time::sleep(Duration::from_millis(100)).await;
    while rx.try_recv().is_ok() {}

    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(ev) = rx.try_recv() {
        assert!(
            !matches!(ev, Event::StoreStatus(_)),
            "status published despite failing engine"
        );
    }

    engine.fail_capacity(false);
    let status = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(Event::StoreStatus(status)) = rx.recv().await {
                return status;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(status.store_id, StoreId(1));
    assert!(!runtime.node().is_stopping());

    runtime.abort();
    runtime.wait().await.unwrap();
}

#[tokio::test]
async fn test_failed_store_gossip_halts_node() {
    let _ = env_logger::try_init();

    let gossip = Arc::new(FlakyGossip::default());
    let runtime = NodeBuilder::new()
        .address("127.0.0.1:26272")
        .unwrap()
        .config(NodeConfig {
            gossip_interval: Duration::from_millis(20),
            publish_status_interval: Duration::from_secs(3600),
            event_feed_capacity: 1024,
        })
        .gossip(gossip.clone())
        .build()
        .await
        .unwrap();
    let node = runtime.node().clone();

    gossip.fail_store_infos(true);

    match tokio::time::timeout(Duration::from_secs(5), runtime.wait())
        .await
        .unwrap()
    {
        Err(NodeError::Fatal(FatalError::GossipStore { store_id, .. })) => {
            assert_eq!(store_id, StoreId(1));
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert!(node.is_stopping());
}

#[tokio::test]
async fn test_rpc_registration_failure_stops_workers() {
    let _ = env_logger::try_init();

    let rpc = Arc::new(RpcServer::new());
    rpc.register(
        BATCH_METHOD,
        Arc::new(|_ba: BatchRequest| {
            async { Ok::<_, NodeError>(BatchResponse::default()) }.boxed()
        }),
    )
    .unwrap();

    let gossip = Arc::new(FlakyGossip::default());
    let result = NodeBuilder::new()
        .address("127.0.0.1:26273")
        .unwrap()
        .config(NodeConfig {
            gossip_interval: Duration::from_millis(20),
            publish_status_interval: Duration::from_secs(3600),
            event_feed_capacity: 1024,
        })
        .gossip(gossip.clone())
        .rpc_server(rpc)
        .build()
        .await;

    match result {
        Err(NodeError::Fatal(FatalError::RpcRegistration(_))) => {}
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("node started despite duplicate RPC method"),
    }

    // the gossip loop is gone, so no further announcements
    let announced = gossip.store_infos();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gossip.store_infos(), announced);
}
