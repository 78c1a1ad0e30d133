//! Resource catalog sync tests.

mod common;

use common::*;
use psmon_core::prelude::*;
use psmon_mem::Operation;

fn ids<T>(items: &[T], id: impl Fn(&T) -> &str) -> Vec<String> {
    items.iter().map(|item| id(item).to_string()).collect()
}

#[tokio::test]
async fn full_sync_updates_both_catalogs() {
    let fx = setup().await;
    let synchronizer = fx.service.synchronizer();
    assert!(synchronizer.last_synced_at().await.is_none());

    let report = fx.service.refresh_resources().await;
    assert!(report.is_complete());
    assert_eq!(
        report.updated,
        vec![ResourceKind::Topics, ResourceKind::Subscriptions]
    );

    assert_eq!(
        ids(&synchronizer.topics().await, |t| t.id.as_str()),
        vec!["orders", "payments"]
    );
    assert_eq!(
        ids(&synchronizer.subscriptions().await, |s| s.id.as_str()),
        vec!["orders-audit", "orders-sub", "orders-webhook", "payments-sub"]
    );
    assert!(synchronizer.last_synced_at().await.is_some());

    assert_eq!(fx.sink.names(), vec!["resources:updated"]);
    match &fx.sink.events()[0] {
        MonitorEvent::ResourcesUpdated {
            topics,
            subscriptions,
        } => {
            assert_eq!(topics.as_ref().map(Vec::len), Some(2));
            assert_eq!(subscriptions.as_ref().map(Vec::len), Some(4));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn partial_failure_keeps_previous_catalog() {
    let fx = setup().await;
    let synchronizer = fx.service.synchronizer();
    fx.service.refresh_resources().await;

    fx.pubsub.add_topic("refunds").await;
    fx.pubsub.add_pull_subscription("refunds-sub", "refunds").await;
    fx.pubsub
        .fail(
            Operation::ListSubscriptions,
            ClientError::Unavailable("listing down".to_string()),
        )
        .await;
    fx.sink.clear();

    let report = fx.service.refresh_resources().await;
    assert!(!report.is_complete());
    assert_eq!(report.updated, vec![ResourceKind::Topics]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].resource, ResourceKind::Subscriptions);

    assert_eq!(synchronizer.topics().await.len(), 3);
    assert_eq!(synchronizer.subscriptions().await.len(), 4);
    assert!(synchronizer.find_subscription("refunds-sub").await.is_none());

    assert_eq!(
        fx.sink.names(),
        vec!["resources:updated", "resources:sync-error"]
    );
    let events = fx.sink.events();
    match &events[0] {
        MonitorEvent::ResourcesUpdated {
            topics,
            subscriptions,
        } => {
            assert_eq!(topics.as_ref().map(Vec::len), Some(3));
            assert!(subscriptions.is_none());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    match &events[1] {
        MonitorEvent::ResourcesSyncError { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].resource, ResourceKind::Subscriptions);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn total_failure_emits_only_sync_error() {
    let fx = setup().await;
    let synchronizer = fx.service.synchronizer();
    fx.pubsub.set_connected(false).await;

    let report = fx.service.refresh_resources().await;
    assert!(report.updated.is_empty());
    assert_eq!(report.failures.len(), 2);

    assert!(synchronizer.topics().await.is_empty());
    assert!(synchronizer.subscriptions().await.is_empty());
    assert!(synchronizer.last_synced_at().await.is_none());
    assert_eq!(fx.sink.names(), vec!["resources:sync-error"]);
}

#[tokio::test]
async fn cache_lookups_use_short_names() {
    let fx = setup().await;
    fx.service.refresh_resources().await;
    let synchronizer = fx.service.synchronizer();

    let for_orders = synchronizer
        .subscriptions_for_topic("projects/demo/topics/orders")
        .await;
    assert_eq!(
        ids(&for_orders, |s| s.id.as_str()),
        vec!["orders-audit", "orders-sub", "orders-webhook"]
    );

    let found = synchronizer
        .find_subscription("projects/demo/subscriptions/payments-sub")
        .await
        .unwrap();
    assert_eq!(found.topic, "payments");
}

#[tokio::test]
async fn background_sync_reports_through_handle() {
    let fx = setup().await;

    let report = fx.service.sync_resources().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(fx.service.synchronizer().topics().await.len(), 2);
}

#[tokio::test]
async fn creating_temporary_subscription_triggers_sync() {
    let fx = setup().await;

    let started = fx
        .service
        .start_topic_monitor("orders", None)
        .await
        .unwrap();
    assert!(fx.sink.wait_for_count("resources:updated", 1, TIMEOUT).await);
    assert!(
        eventually(|| async {
            fx.service
                .synchronizer()
                .find_subscription(&started.subscription_id)
                .await
                .is_some()
        })
        .await
    );

    fx.service.stop_topic_monitor("orders").await;
    assert!(fx.sink.wait_for_count("resources:updated", 2, TIMEOUT).await);
    assert!(
        eventually(|| async {
            fx.service
                .synchronizer()
                .find_subscription(&started.subscription_id)
                .await
                .is_none()
        })
        .await
    );
}
