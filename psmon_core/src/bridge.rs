//! This module defines the `TopicMonitorBridge`, which lets a topic be watched through the
//! subscription-level monitor.
//!
//! The messaging service cannot tail a topic directly, so the bridge resolves a subscription
//! for it: an explicitly chosen one, a reusable temporary one found in the cached catalog, or
//! a newly created temporary one. Temporary subscriptions are always created with an
//! expiration TTL. Deleting them on stop is best-effort; the TTL is what guarantees the
//! service eventually reclaims them.
//!
//! The bridge listens for workers the registry reaps after a stream failure. The topic entry
//! of a reaped worker is dropped and its temporary subscription deleted, so every recorded
//! topic is backed by a live monitor.

use crate::client::{CreateSubscription, MessagingClient};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::naming::{is_temp_subscription_for, new_temp_subscription_id, same_resource};
use crate::registry::MonitorRegistry;
use crate::sync::ResourceSynchronizer;
use crate::worker::WorkerExitHandler;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// The subscription serving a topic monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicLink {
    /// The monitored subscription
    pub subscription_id: String,
    /// Whether the subscription is a temporary one, deleted when the topic monitor stops
    pub temporary: bool,
}

/// How the subscription behind a topic monitor was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionSource {
    /// Chosen by the caller
    Explicit,
    /// An existing temporary subscription found in the cache
    Reused,
    /// A temporary subscription created for this monitor
    Created,
}

/// The result of starting a topic monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMonitorStart {
    /// The subscription now monitored on behalf of the topic
    pub subscription_id: String,
    /// Where that subscription came from
    pub source: SubscriptionSource,
}

/// Topic-level monitor orchestration on top of [`MonitorRegistry`].
pub struct TopicMonitorBridge {
    client: Arc<dyn MessagingClient>,
    registry: Arc<MonitorRegistry>,
    synchronizer: Arc<ResourceSynchronizer>,
    links: RwLock<HashMap<String, TopicLink>>,
}

impl TopicMonitorBridge {
    /// Creates a bridge with no active topic monitors.
    pub fn new(
        client: Arc<dyn MessagingClient>,
        registry: Arc<MonitorRegistry>,
        synchronizer: Arc<ResourceSynchronizer>,
    ) -> Self {
        Self {
            client,
            registry,
            synchronizer,
            links: RwLock::new(HashMap::new()),
        }
    }

    /// Starts monitoring a topic.
    ///
    /// With `subscription_id`, that subscription must exist, be a pull subscription attached
    /// to `topic_id`, and not already be monitored. Without it, a cached temporary
    /// subscription for the topic is reused if one is idle; otherwise a new temporary
    /// subscription is created. A subscription created here is deleted again if its monitor
    /// fails to start.
    pub async fn start_topic_monitor(
        &self,
        topic_id: &str,
        subscription_id: Option<&str>,
    ) -> Result<TopicMonitorStart, MonitorError> {
        self.ensure_topic_free(topic_id).await?;
        let config = self.registry.config().await;

        let resolved = match subscription_id {
            Some(subscription_id) => self.validate_explicit(topic_id, subscription_id).await?,
            None => match self.find_reusable(topic_id, &config).await {
                Some(subscription_id) => TopicMonitorStart {
                    subscription_id,
                    source: SubscriptionSource::Reused,
                },
                None => self.create_temporary(topic_id, &config).await?,
            },
        };

        if let Err(e) = self.registry.start_monitor(&resolved.subscription_id).await {
            if resolved.source == SubscriptionSource::Created {
                self.delete_temporary(&resolved.subscription_id).await;
            }
            return Err(e);
        }

        let link = TopicLink {
            subscription_id: resolved.subscription_id.clone(),
            temporary: resolved.source != SubscriptionSource::Explicit,
        };
        let lost_race = {
            let mut links = self.links.write().await;
            if links.contains_key(topic_id) {
                true
            } else {
                links.insert(topic_id.to_string(), link.clone());
                false
            }
        };

        if lost_race {
            // Another start for this topic recorded its mapping first; undo ours.
            self.teardown(topic_id, &link, &config).await;
            return Err(MonitorError::TopicAlreadyMonitored(topic_id.to_string()));
        }

        // A worker reaped before the mapping existed was not seen by the failure listener.
        if !self.registry.is_monitoring(&link.subscription_id).await
            && let Some(stale) = self.remove_if_current(topic_id, &link).await
        {
            warn!("Monitor for topic '{}' failed while starting", topic_id);
            self.release(&stale).await;
        }

        info!(
            "Monitoring topic '{}' through '{}' ({:?})",
            topic_id, resolved.subscription_id, resolved.source
        );
        Ok(resolved)
    }

    /// Stops monitoring a topic and deletes its temporary subscription.
    ///
    /// Never fails: a topic with no active monitor is a no-op, and teardown errors are logged.
    /// Returns the entry this call removed, if any.
    pub async fn stop_topic_monitor(&self, topic_id: &str) -> Option<TopicLink> {
        let link = {
            let mut links = self.links.write().await;
            links.remove(topic_id)
        };
        let Some(link) = link else {
            debug!("No active monitor for topic '{}', nothing to stop", topic_id);
            return None;
        };

        let config = self.registry.config().await;
        self.teardown(topic_id, &link, &config).await;
        info!("Stopped monitoring topic '{}'", topic_id);
        Some(link)
    }

    /// Stops every topic monitor. Returns the topics that were stopped.
    pub async fn stop_all(&self) -> Vec<String> {
        let topics: Vec<String> = {
            let links = self.links.read().await;
            links.keys().cloned().collect()
        };
        let mut stopped = Vec::with_capacity(topics.len());
        for topic_id in topics {
            if self.stop_topic_monitor(&topic_id).await.is_some() {
                stopped.push(topic_id);
            }
        }
        stopped
    }

    /// The subscription currently serving a topic monitor.
    pub async fn topic_subscription(&self, topic_id: &str) -> Option<TopicLink> {
        self.links.read().await.get(topic_id).cloned()
    }

    /// All active topic monitors, sorted by topic.
    pub async fn active_topic_monitors(&self) -> Vec<(String, TopicLink)> {
        let links = self.links.read().await;
        let mut active: Vec<(String, TopicLink)> = links
            .iter()
            .map(|(topic, link)| (topic.clone(), link.clone()))
            .collect();
        active.sort_by(|a, b| a.0.cmp(&b.0));
        active
    }

    /// Fails if the topic has a live monitor. A mapping whose worker is gone is dropped and
    /// its temporary subscription deleted.
    async fn ensure_topic_free(&self, topic_id: &str) -> Result<(), MonitorError> {
        let existing = self.links.read().await.get(topic_id).cloned();
        let Some(existing) = existing else {
            return Ok(());
        };

        if self.registry.is_monitoring(&existing.subscription_id).await {
            return Err(MonitorError::TopicAlreadyMonitored(topic_id.to_string()));
        }

        if let Some(stale) = self.remove_if_current(topic_id, &existing).await {
            warn!(
                "Dropping stale monitor mapping '{}' -> '{}'",
                topic_id, stale.subscription_id
            );
            self.release(&stale).await;
        }
        Ok(())
    }

    /// Removes the topic entry only if it still is `expected`.
    async fn remove_if_current(&self, topic_id: &str, expected: &TopicLink) -> Option<TopicLink> {
        let mut links = self.links.write().await;
        if links.get(topic_id) == Some(expected) {
            links.remove(topic_id)
        } else {
            None
        }
    }

    async fn validate_explicit(
        &self,
        topic_id: &str,
        subscription_id: &str,
    ) -> Result<TopicMonitorStart, MonitorError> {
        let subscription = self.client.get_subscription(subscription_id).await?;
        if subscription.is_push() {
            return Err(MonitorError::PushSubscription(subscription_id.to_string()));
        }
        if !same_resource(&subscription.topic, topic_id) {
            return Err(MonitorError::TopicMismatch {
                subscription: subscription_id.to_string(),
                expected: topic_id.to_string(),
                actual: subscription.topic,
            });
        }
        if self.registry.is_monitoring(subscription_id).await {
            return Err(MonitorError::AlreadyMonitoring(subscription_id.to_string()));
        }
        Ok(TopicMonitorStart {
            subscription_id: subscription_id.to_string(),
            source: SubscriptionSource::Explicit,
        })
    }

    // The cache may be stale; a match here can point at a subscription that no longer exists.
    async fn find_reusable(&self, topic_id: &str, config: &MonitorConfig) -> Option<String> {
        for candidate in self.synchronizer.subscriptions_for_topic(topic_id).await {
            if candidate.is_push()
                || !is_temp_subscription_for(
                    &config.temp_subscription_prefix,
                    topic_id,
                    config.topic_name_max_len,
                    &candidate.id,
                )
            {
                continue;
            }
            if self.registry.is_monitoring(&candidate.id).await {
                continue;
            }
            debug!(
                "Reusing temporary subscription '{}' for topic '{}'",
                candidate.id, topic_id
            );
            return Some(candidate.id);
        }
        None
    }

    async fn create_temporary(
        &self,
        topic_id: &str,
        config: &MonitorConfig,
    ) -> Result<TopicMonitorStart, MonitorError> {
        let subscription_id = new_temp_subscription_id(
            &config.temp_subscription_prefix,
            topic_id,
            config.topic_name_max_len,
        );
        let created = self
            .client
            .create_subscription(CreateSubscription {
                id: subscription_id.clone(),
                topic: topic_id.to_string(),
                ack_deadline: config.temp_ack_deadline(),
                expiration_ttl: Some(config.temp_subscription_ttl()),
            })
            .await?;
        info!(
            "Created temporary subscription '{}' for topic '{}' (ttl {:?})",
            created.id,
            topic_id,
            config.temp_subscription_ttl()
        );
        Ok(TopicMonitorStart {
            subscription_id: created.id,
            source: SubscriptionSource::Created,
        })
    }

    async fn teardown(&self, topic_id: &str, link: &TopicLink, config: &MonitorConfig) {
        if let Err(e) = self.registry.stop_monitor(&link.subscription_id).await {
            warn!(
                "Error stopping monitor '{}' for topic '{}': {}",
                link.subscription_id, topic_id, e
            );
        }

        if link.temporary {
            // Let in-flight receives and acks settle before the subscription disappears.
            tokio::time::sleep(config.teardown_delay()).await;
            self.delete_temporary(&link.subscription_id).await;
        }
    }

    /// Deletes the temporary subscription of an entry whose monitor is already gone.
    async fn release(&self, link: &TopicLink) {
        if link.temporary {
            self.delete_temporary(&link.subscription_id).await;
            self.synchronizer.spawn_sync();
        }
    }

    async fn delete_temporary(&self, subscription_id: &str) {
        match self.client.delete_subscription(subscription_id).await {
            Ok(()) => info!("Deleted temporary subscription '{}'", subscription_id),
            Err(e) if e.is_not_found() || e.is_failed_precondition() => {
                debug!(
                    "Temporary subscription '{}' not deleted: {}",
                    subscription_id, e
                );
            }
            Err(e) => warn!(
                "Failed to delete temporary subscription '{}', leaving it to its TTL: {}",
                subscription_id, e
            ),
        }
    }
}

#[async_trait]
impl WorkerExitHandler for TopicMonitorBridge {
    async fn on_worker_failed(&self, subscription_id: &str, _generation: Uuid) {
        let removed = {
            let mut links = self.links.write().await;
            let topic = links
                .iter()
                .find(|(_, link)| link.subscription_id == subscription_id)
                .map(|(topic, _)| topic.clone());
            topic.and_then(|topic| links.remove(&topic).map(|link| (topic, link)))
        };
        let Some((topic_id, link)) = removed else {
            return;
        };

        warn!(
            "Topic '{}' is no longer monitored: its subscription '{}' failed",
            topic_id, link.subscription_id
        );
        self.release(&link).await;
    }
}

impl std::fmt::Debug for TopicMonitorBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicMonitorBridge").finish_non_exhaustive()
    }
}
