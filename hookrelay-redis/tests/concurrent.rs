//! Concurrent correctness tests against real Redis (via testcontainers).
//!
//! These tests verify distributed invariants that only surface when multiple
//! workers share the same Redis-backed queue. They require Docker.
//!
//! Run with: `cargo test -p hookrelay-redis --test concurrent`
//! Skip if Docker unavailable: tests will fail with connection errors.

use std::collections::HashSet;
use std::sync::Arc;

use hookrelay_core::types::{DeliveryQueue, QueueMessage};
use hookrelay_redis::RedisDeliveryQueue;

fn make_message(delivery_id: &str) -> QueueMessage {
    QueueMessage {
        endpoint_id: "ep1".to_string(),
        delivery_id: delivery_id.to_string(),
        raw_body: "{}".to_string(),
        headers: Default::default(),
        received_at: 0,
        attempt: 0,
        manual_retry: None,
        original_delivery_id: None,
        dlq_replay: None,
        original_dlq_key: None,
    }
}

async fn make_queue(redis_url: &str) -> RedisDeliveryQueue {
    let client = redis::Client::open(redis_url).unwrap();
    let conn = client.get_multiplexed_async_connection().await.unwrap();
    RedisDeliveryQueue::new(conn, Some("test"))
}

async fn flush_redis(redis_url: &str) {
    let client = redis::Client::open(redis_url).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    redis::cmd("FLUSHALL").query_async::<()>(&mut conn).await.unwrap();
}

#[tokio::test]
async fn concurrent_receivers_never_get_the_same_message_twice() {
    let container = testcontainers::runners::AsyncRunner::start(
        testcontainers_modules::redis::Redis::default(),
    )
    .await
    .unwrap();
    let port = container.get_host_port_ipv4(6379).await.unwrap();
    let redis_url = format!("redis://127.0.0.1:{port}");
    flush_redis(&redis_url).await;

    let queue = Arc::new(make_queue(&redis_url).await);
    let count = 40;
    for i in 0..count {
        queue
            .enqueue(make_message(&format!("d{i}")), 0)
            .await
            .unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..count {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            queue.receive(5_000).await.unwrap()
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let delivery_ids: HashSet<String> = results
        .iter()
        .flatten()
        .map(|r| r.message.delivery_id.clone())
        .collect();

    assert_eq!(
        delivery_ids.len(),
        count,
        "every concurrent receive must return a distinct message, got {} unique out of {}",
        delivery_ids.len(),
        count
    );
}

#[tokio::test]
async fn delayed_message_is_invisible_until_its_delay_elapses() {
    let container = testcontainers::runners::AsyncRunner::start(
        testcontainers_modules::redis::Redis::default(),
    )
    .await
    .unwrap();
    let port = container.get_host_port_ipv4(6379).await.unwrap();
    let redis_url = format!("redis://127.0.0.1:{port}");
    flush_redis(&redis_url).await;

    let queue = make_queue(&redis_url).await;
    queue.enqueue(make_message("delayed"), 500).await.unwrap();

    assert!(queue.receive(1_000).await.unwrap().is_none());

    tokio::time::sleep(std::time::Duration::from_millis(600)).await;

    let received = queue.receive(1_000).await.unwrap();
    assert_eq!(received.unwrap().message.delivery_id, "delayed");
}

#[tokio::test]
async fn deleting_a_receipt_removes_the_message_for_good() {
    let container = testcontainers::runners::AsyncRunner::start(
        testcontainers_modules::redis::Redis::default(),
    )
    .await
    .unwrap();
    let port = container.get_host_port_ipv4(6379).await.unwrap();
    let redis_url = format!("redis://127.0.0.1:{port}");
    flush_redis(&redis_url).await;

    let queue = make_queue(&redis_url).await;
    queue.enqueue(make_message("d1"), 0).await.unwrap();

    let received = queue.receive(50).await.unwrap().unwrap();
    queue.delete(&received.receipt).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(queue.receive(50).await.unwrap().is_none());
}

#[tokio::test]
async fn visibility_timeout_expiry_makes_a_message_redeliverable() {
    let container = testcontainers::runners::AsyncRunner::start(
        testcontainers_modules::redis::Redis::default(),
    )
    .await
    .unwrap();
    let port = container.get_host_port_ipv4(6379).await.unwrap();
    let redis_url = format!("redis://127.0.0.1:{port}");
    flush_redis(&redis_url).await;

    let queue = make_queue(&redis_url).await;
    queue.enqueue(make_message("d1"), 0).await.unwrap();

    let first = queue.receive(200).await.unwrap().unwrap();
    assert!(queue.receive(200).await.unwrap().is_none());

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let second = queue.receive(200).await.unwrap();
    assert_eq!(second.unwrap().message.delivery_id, first.message.delivery_id);
}
