//! This module defines the `ResourceSynchronizer`, which fetches the topic and subscription
//! catalogs in parallel and caches them.
//!
//! The two catalogs are independent: a failed fetch leaves that catalog at its previous value
//! and never touches the other one.

use crate::client::{ClientError, MessagingClient, SubscriptionInfo, TopicInfo};
use crate::event::{EventSink, MonitorEvent, ResourceKind, SyncFailure};
use crate::naming::same_resource;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct Catalog {
    topics: Vec<TopicInfo>,
    subscriptions: Vec<SubscriptionInfo>,
    last_synced_at: Option<DateTime<Utc>>,
}

/// The outcome of one sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Resource kinds whose cache was refreshed
    pub updated: Vec<ResourceKind>,
    /// Resource kinds whose fetch failed
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    /// Whether both catalogs were refreshed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Caches the topic and subscription catalogs of the current project.
pub struct ResourceSynchronizer {
    client: Arc<dyn MessagingClient>,
    sink: Arc<dyn EventSink>,
    catalog: RwLock<Catalog>,
}

impl ResourceSynchronizer {
    /// Creates a synchronizer with empty caches.
    pub fn new(client: Arc<dyn MessagingClient>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            client,
            sink,
            catalog: RwLock::new(Catalog::default()),
        }
    }

    /// Fetches both catalogs concurrently and updates the cache with whichever succeeded.
    ///
    /// Emits `resources:updated` with the refreshed catalogs if at least one fetch succeeded,
    /// and `resources:sync-error` naming each failed fetch.
    pub async fn sync(&self) -> SyncReport {
        let topics_client = self.client.clone();
        let subscriptions_client = self.client.clone();
        let topics_task = tokio::spawn(async move { topics_client.list_topics().await });
        let subscriptions_task =
            tokio::spawn(async move { subscriptions_client.list_subscriptions().await });

        let (topics, subscriptions) = tokio::join!(topics_task, subscriptions_task);
        let topics = flatten_join(topics);
        let subscriptions = flatten_join(subscriptions);

        let mut report = SyncReport::default();
        let mut updated_topics = None;
        let mut updated_subscriptions = None;

        {
            let mut catalog = self.catalog.write().await;
            match topics {
                Ok(topics) => {
                    catalog.topics = topics.clone();
                    updated_topics = Some(topics);
                    report.updated.push(ResourceKind::Topics);
                }
                Err(e) => report.failures.push(SyncFailure {
                    resource: ResourceKind::Topics,
                    error: e.to_string(),
                }),
            }
            match subscriptions {
                Ok(subscriptions) => {
                    catalog.subscriptions = subscriptions.clone();
                    updated_subscriptions = Some(subscriptions);
                    report.updated.push(ResourceKind::Subscriptions);
                }
                Err(e) => report.failures.push(SyncFailure {
                    resource: ResourceKind::Subscriptions,
                    error: e.to_string(),
                }),
            }
            if !report.updated.is_empty() {
                catalog.last_synced_at = Some(Utc::now());
            }
        }

        if !report.updated.is_empty() {
            info!(
                "Resource sync updated {}",
                report
                    .updated
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            self.sink.notify(MonitorEvent::ResourcesUpdated {
                topics: updated_topics,
                subscriptions: updated_subscriptions,
            });
        }

        if !report.failures.is_empty() {
            for failure in &report.failures {
                warn!("Failed to sync {}: {}", failure.resource, failure.error);
            }
            self.sink.notify(MonitorEvent::ResourcesSyncError {
                failures: report.failures.clone(),
            });
        }

        report
    }

    /// Runs [`sync`](Self::sync) in the background.
    pub fn spawn_sync(self: &Arc<Self>) -> JoinHandle<SyncReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.sync().await })
    }

    /// The cached topic catalog.
    pub async fn topics(&self) -> Vec<TopicInfo> {
        self.catalog.read().await.topics.clone()
    }

    /// The cached subscription catalog.
    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.catalog.read().await.subscriptions.clone()
    }

    /// Cached subscriptions attached to `topic_id`.
    pub async fn subscriptions_for_topic(&self, topic_id: &str) -> Vec<SubscriptionInfo> {
        let catalog = self.catalog.read().await;
        catalog
            .subscriptions
            .iter()
            .filter(|s| same_resource(&s.topic, topic_id))
            .cloned()
            .collect()
    }

    /// Looks up a cached subscription by id.
    pub async fn find_subscription(&self, subscription_id: &str) -> Option<SubscriptionInfo> {
        let catalog = self.catalog.read().await;
        catalog
            .subscriptions
            .iter()
            .find(|s| same_resource(&s.id, subscription_id))
            .cloned()
    }

    /// When the cache was last refreshed by a (partially) successful sync.
    pub async fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.catalog.read().await.last_synced_at
    }
}

impl std::fmt::Debug for ResourceSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSynchronizer").finish_non_exhaustive()
    }
}

fn flatten_join<T>(
    joined: Result<Result<T, ClientError>, tokio::task::JoinError>,
) -> Result<T, ClientError> {
    match joined {
        Ok(result) => result,
        Err(e) => Err(ClientError::Other(format!("Fetch task failed: {e}"))),
    }
}
