#![allow(dead_code)]

use psmon_core::prelude::*;
use psmon_mem::{InMemoryPubSub, RecordingEventSink};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(2);

pub struct Fixture {
    pub pubsub: InMemoryPubSub,
    pub sink: RecordingEventSink,
    pub service: MonitorService,
}

pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        teardown_delay_ms: 10,
        ..MonitorConfig::default()
    }
}

pub async fn setup() -> Fixture {
    setup_with(test_config()).await
}

pub async fn setup_with(config: MonitorConfig) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let pubsub = InMemoryPubSub::new();
    pubsub.add_topic("orders").await;
    pubsub.add_topic("payments").await;
    pubsub.add_pull_subscription("orders-sub", "orders").await;
    pubsub.add_pull_subscription("orders-audit", "orders").await;
    pubsub.add_pull_subscription("payments-sub", "payments").await;
    pubsub.add_push_subscription("orders-webhook", "orders").await;

    let sink = RecordingEventSink::new();
    let service = MonitorService::new(
        Arc::new(pubsub.clone()),
        Arc::new(sink.clone()),
        config,
    );
    Fixture {
        pubsub,
        sink,
        service,
    }
}

/// Polls `check` until it returns true or the timeout elapses.
pub async fn eventually<F, Fut>(check: F) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn payloads(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|m| m.data_as_text().into_owned())
        .collect()
}
