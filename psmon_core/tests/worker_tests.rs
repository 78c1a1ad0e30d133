//! Stream worker lifecycle tests.

mod common;

use common::*;
use psmon_core::prelude::*;
use psmon_mem::{InMemoryPubSub, Operation, RecordingEventSink};
use std::sync::Arc;
use std::time::Duration;

async fn worker_for(
    pubsub: &InMemoryPubSub,
    sink: &RecordingEventSink,
    capacity: usize,
    ack_mode: AckMode,
) -> StreamWorker {
    let _ = env_logger::builder().is_test(true).try_init();
    pubsub.add_topic("orders").await;
    pubsub.add_pull_subscription("orders-sub", "orders").await;
    StreamWorker::new(
        "orders-sub",
        MessageBuffer::new(capacity),
        ack_mode,
        Arc::new(pubsub.clone()),
        Arc::new(sink.clone()),
    )
}

#[tokio::test]
async fn buffers_notifies_and_acks_in_order() {
    let pubsub = InMemoryPubSub::new();
    let sink = RecordingEventSink::new();
    let worker = worker_for(&pubsub, &sink, 10, AckMode::Auto).await;

    worker.start().await.unwrap();
    assert!(worker.is_running().await);
    for text in ["a", "b", "c"] {
        pubsub.publish_text("orders", text).await.unwrap();
    }

    assert!(sink.wait_for_count("message:received", 3, TIMEOUT).await);
    assert_eq!(
        payloads(&worker.buffer().snapshot().await),
        vec!["a", "b", "c"]
    );
    assert!(eventually(|| async { pubsub.acked_message_ids("orders-sub").await.len() == 3 }).await);

    worker.stop().await.unwrap();
    assert!(!worker.is_running().await);
}

#[tokio::test]
async fn start_twice_fails() {
    let pubsub = InMemoryPubSub::new();
    let sink = RecordingEventSink::new();
    let worker = worker_for(&pubsub, &sink, 10, AckMode::Auto).await;

    worker.start().await.unwrap();
    assert!(matches!(
        worker.start().await,
        Err(MonitorError::WorkerAlreadyRunning(_))
    ));
    worker.stop().await.unwrap();
}

#[tokio::test]
async fn stop_without_start_fails() {
    let pubsub = InMemoryPubSub::new();
    let sink = RecordingEventSink::new();
    let worker = worker_for(&pubsub, &sink, 10, AckMode::Auto).await;

    assert!(matches!(
        worker.stop().await,
        Err(MonitorError::WorkerNotRunning(_))
    ));

    worker.start().await.unwrap();
    worker.stop().await.unwrap();
    assert!(matches!(
        worker.stop().await,
        Err(MonitorError::WorkerNotRunning(_))
    ));
}

#[tokio::test]
async fn nothing_is_appended_after_stop_returns() {
    let pubsub = InMemoryPubSub::new();
    let sink = RecordingEventSink::new();
    let worker = worker_for(&pubsub, &sink, 10, AckMode::Auto).await;

    worker.start().await.unwrap();
    pubsub.publish_text("orders", "before").await.unwrap();
    assert!(sink.wait_for_count("message:received", 1, TIMEOUT).await);

    worker.stop().await.unwrap();
    pubsub.publish_text("orders", "after").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(payloads(&worker.buffer().snapshot().await), vec!["before"]);
    assert_eq!(sink.count("message:received"), 1);
}

#[tokio::test]
async fn manual_mode_leaves_messages_unacked_until_switched() {
    let pubsub = InMemoryPubSub::new();
    let sink = RecordingEventSink::new();
    let worker = worker_for(&pubsub, &sink, 10, AckMode::Manual).await;

    worker.start().await.unwrap();
    pubsub.publish_text("orders", "kept").await.unwrap();
    assert!(sink.wait_for_count("message:received", 1, TIMEOUT).await);
    assert_eq!(pubsub.unacked_count("orders-sub").await, 1);

    worker.set_ack_mode(AckMode::Auto);
    assert_eq!(worker.ack_mode(), AckMode::Auto);
    pubsub.publish_text("orders", "acked").await.unwrap();
    assert!(sink.wait_for_count("message:received", 2, TIMEOUT).await);
    assert!(eventually(|| async { pubsub.acked_message_ids("orders-sub").await.len() == 1 }).await);
    assert_eq!(pubsub.unacked_count("orders-sub").await, 1);

    worker.stop().await.unwrap();
}

#[tokio::test]
async fn ack_failure_does_not_stop_the_worker() {
    let pubsub = InMemoryPubSub::new();
    let sink = RecordingEventSink::new();
    let worker = worker_for(&pubsub, &sink, 10, AckMode::Auto).await;
    pubsub
        .fail(
            Operation::Acknowledge,
            ClientError::Unavailable("ack down".to_string()),
        )
        .await;

    worker.start().await.unwrap();
    pubsub.publish_text("orders", "one").await.unwrap();
    pubsub.publish_text("orders", "two").await.unwrap();

    assert!(sink.wait_for_count("message:received", 2, TIMEOUT).await);
    assert!(worker.is_running().await);
    assert_eq!(sink.count("monitor:error"), 0);
    worker.stop().await.unwrap();
}

#[tokio::test]
async fn open_failure_is_reported_asynchronously() {
    let pubsub = InMemoryPubSub::new();
    let sink = RecordingEventSink::new();
    let worker = worker_for(&pubsub, &sink, 10, AckMode::Auto).await;
    pubsub
        .fail_for(
            Operation::OpenPull,
            "orders-sub",
            ClientError::Unavailable("no session".to_string()),
        )
        .await;

    assert!(worker.start().await.is_ok());
    assert!(sink.wait_for_count("monitor:error", 1, TIMEOUT).await);
    assert!(eventually(|| async { !worker.is_running().await }).await);

    // The task already exited; stopping still joins it cleanly.
    worker.stop().await.unwrap();
}

#[tokio::test]
async fn buffer_is_bounded_while_streaming() {
    let pubsub = InMemoryPubSub::new();
    let sink = RecordingEventSink::new();
    let worker = worker_for(&pubsub, &sink, 3, AckMode::Auto).await;

    worker.start().await.unwrap();
    for i in 0..7 {
        pubsub.publish_text("orders", &i.to_string()).await.unwrap();
    }
    assert!(sink.wait_for_count("message:received", 7, TIMEOUT).await);
    assert_eq!(
        payloads(&worker.buffer().snapshot().await),
        vec!["4", "5", "6"]
    );
    worker.stop().await.unwrap();
}
