//! The operations exposed to the presentation layer.

use crate::bridge::{SubscriptionSource, TopicLink, TopicMonitorBridge, TopicMonitorStart};
use crate::client::MessagingClient;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::event::EventSink;
use crate::message::{AckMode, Message};
use crate::registry::MonitorRegistry;
use crate::sync::{ResourceSynchronizer, SyncReport};
use crate::worker::WorkerExitHandler;
use log::info;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

/// Monitoring facade composing the registry, topic bridge and resource synchronizer.
///
/// ```ignore
/// use std::sync::Arc;
/// use psmon_core::prelude::*;
///
/// let (sink, mut events) = ChannelEventSink::new();
/// let service = MonitorService::new(client, Arc::new(sink), MonitorConfig::default());
///
/// service.refresh_resources().await;
/// service.start_topic_monitor("orders", None).await?;
/// while let Some(event) = events.recv().await {
///     println!("{}: {}", event.name(), event.payload());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MonitorService {
    registry: Arc<MonitorRegistry>,
    bridge: Arc<TopicMonitorBridge>,
    synchronizer: Arc<ResourceSynchronizer>,
}

impl MonitorService {
    /// Creates a service with no active monitors and an empty resource cache.
    ///
    /// The bridge is registered for worker failures, so a topic whose monitor dies is
    /// released together with its temporary subscription.
    pub fn new(
        client: Arc<dyn MessagingClient>,
        sink: Arc<dyn EventSink>,
        config: MonitorConfig,
    ) -> Self {
        let registry = Arc::new(MonitorRegistry::new(client.clone(), sink.clone(), config));
        let synchronizer = Arc::new(ResourceSynchronizer::new(client.clone(), sink));
        let bridge = Arc::new(TopicMonitorBridge::new(
            client,
            registry.clone(),
            synchronizer.clone(),
        ));
        let listener: Weak<dyn WorkerExitHandler> = Arc::downgrade(&bridge) as Weak<TopicMonitorBridge>;
        registry.add_exit_listener(listener);
        Self {
            registry,
            bridge,
            synchronizer,
        }
    }

    /// The subscription-level registry.
    pub fn registry(&self) -> &Arc<MonitorRegistry> {
        &self.registry
    }

    /// The topic-level bridge.
    pub fn bridge(&self) -> &Arc<TopicMonitorBridge> {
        &self.bridge
    }

    /// The resource cache.
    pub fn synchronizer(&self) -> &Arc<ResourceSynchronizer> {
        &self.synchronizer
    }

    /// Starts monitoring a pull subscription.
    pub async fn start_monitor(&self, subscription_id: &str) -> Result<(), MonitorError> {
        self.registry.start_monitor(subscription_id).await
    }

    /// Stops monitoring a subscription.
    pub async fn stop_monitor(&self, subscription_id: &str) -> Result<(), MonitorError> {
        self.registry.stop_monitor(subscription_id).await
    }

    /// Starts monitoring a topic, optionally through a chosen subscription.
    ///
    /// Schedules a resource sync when a temporary subscription was created.
    pub async fn start_topic_monitor(
        &self,
        topic_id: &str,
        subscription_id: Option<&str>,
    ) -> Result<TopicMonitorStart, MonitorError> {
        let started = self
            .bridge
            .start_topic_monitor(topic_id, subscription_id)
            .await?;
        if started.source == SubscriptionSource::Created {
            self.synchronizer.spawn_sync();
        }
        Ok(started)
    }

    /// Stops monitoring a topic. Always succeeds; teardown failures are logged.
    pub async fn stop_topic_monitor(&self, topic_id: &str) {
        let stopped = self.bridge.stop_topic_monitor(topic_id).await;
        if stopped.is_some_and(|link| link.temporary) {
            self.synchronizer.spawn_sync();
        }
    }

    /// Returns the messages buffered for a monitored subscription, oldest first.
    pub async fn get_buffered_messages(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<Message>, MonitorError> {
        self.registry.get_buffered_messages(subscription_id).await
    }

    /// Clears the buffer of a monitored subscription.
    pub async fn clear_message_buffer(&self, subscription_id: &str) -> Result<(), MonitorError> {
        self.registry.clear_buffer(subscription_id).await
    }

    /// Sets the acknowledgment mode for running and future monitors.
    pub async fn set_ack_mode(&self, mode: AckMode) {
        self.registry.set_global_ack_mode(mode).await;
    }

    /// Sets the buffer capacity of monitors started from now on.
    pub async fn set_buffer_capacity(&self, capacity: usize) {
        self.registry.set_buffer_capacity(capacity).await;
    }

    /// Triggers a background resource sync.
    pub fn sync_resources(&self) -> JoinHandle<SyncReport> {
        self.synchronizer.spawn_sync()
    }

    /// Runs a resource sync and waits for it.
    pub async fn refresh_resources(&self) -> SyncReport {
        self.synchronizer.sync().await
    }

    /// The active topic monitors, sorted by topic.
    pub async fn active_topic_monitors(&self) -> Vec<(String, TopicLink)> {
        self.bridge.active_topic_monitors().await
    }

    /// The monitored subscriptions, sorted.
    pub async fn active_monitors(&self) -> Vec<String> {
        self.registry.active_monitors().await
    }

    /// Stops every topic monitor, deleting temporary subscriptions, then every remaining
    /// subscription monitor.
    pub async fn shutdown(&self) {
        let topics = self.bridge.stop_all().await;
        let subscriptions = self.registry.stop_all().await;
        info!(
            "Monitor shutdown complete ({} topic monitors, {} subscription monitors stopped)",
            topics.len(),
            subscriptions.len()
        );
    }
}
