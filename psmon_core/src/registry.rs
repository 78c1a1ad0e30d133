//! This module defines the `MonitorRegistry`, which owns the running stream workers and
//! enforces at most one worker per subscription.
//!
//! Lock discipline: the worker map is guarded by a single `RwLock`. Metadata fetches happen
//! before the lock is taken and worker shutdown happens after it is released, so no network
//! I/O runs while the map is locked.
//!
//! A worker whose pull session fails is removed by the registry itself. Components layered on
//! top (the topic bridge) subscribe to those removals with [`MonitorRegistry::add_exit_listener`].

use crate::buffer::MessageBuffer;
use crate::client::MessagingClient;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::event::{EventSink, MonitorEvent};
use crate::message::{AckMode, Message};
use crate::worker::{StreamWorker, WorkerExitHandler};
use async_trait::async_trait;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Subscription id -> running worker.
type Workers = RwLock<HashMap<String, Arc<StreamWorker>>>;

/// Handlers told about workers the registry removed after a stream failure.
type ExitListeners = Mutex<Vec<Weak<dyn WorkerExitHandler>>>;

/// Subscription-level monitor orchestration.
pub struct MonitorRegistry {
    client: Arc<dyn MessagingClient>,
    sink: Arc<dyn EventSink>,
    config: RwLock<MonitorConfig>,
    workers: Arc<Workers>,
    listeners: Arc<ExitListeners>,
}

impl MonitorRegistry {
    /// Creates an empty registry.
    pub fn new(
        client: Arc<dyn MessagingClient>,
        sink: Arc<dyn EventSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            client,
            sink,
            config: RwLock::new(config),
            workers: Arc::new(RwLock::new(HashMap::new())),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers a handler called after a failed worker has been removed from the registry.
    ///
    /// Only a weak reference is kept; dropped listeners are skipped.
    pub fn add_exit_listener(&self, listener: Weak<dyn WorkerExitHandler>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Returns a copy of the current configuration.
    pub async fn config(&self) -> MonitorConfig {
        self.config.read().await.clone()
    }

    /// The acknowledgment mode applied to newly started workers.
    pub async fn ack_mode(&self) -> AckMode {
        self.config.read().await.ack_mode
    }

    /// Changes the buffer capacity of workers started from now on.
    pub async fn set_buffer_capacity(&self, capacity: usize) {
        self.config.write().await.buffer_capacity = capacity;
        info!("Monitor buffer capacity set to {}", capacity);
    }

    /// Starts monitoring a pull subscription.
    ///
    /// Fails if the subscription is a push subscription or already has a monitor.
    pub async fn start_monitor(&self, subscription_id: &str) -> Result<(), MonitorError> {
        let subscription = self.client.get_subscription(subscription_id).await?;
        if subscription.is_push() {
            return Err(MonitorError::PushSubscription(subscription_id.to_string()));
        }

        let (capacity, ack_mode) = {
            let mut workers = self.workers.write().await;
            if workers.contains_key(subscription_id) {
                return Err(MonitorError::AlreadyMonitoring(subscription_id.to_string()));
            }

            // Read under the map lock so a concurrent `set_global_ack_mode` cannot miss
            // this worker.
            let (capacity, ack_mode) = {
                let config = self.config.read().await;
                (config.buffer_capacity, config.ack_mode)
            };

            let reaper = Arc::new(Reaper {
                workers: Arc::downgrade(&self.workers),
                listeners: self.listeners.clone(),
            });
            let worker = StreamWorker::new(
                subscription_id,
                MessageBuffer::new(capacity),
                ack_mode,
                self.client.clone(),
                self.sink.clone(),
            )
            .with_exit_handler(reaper);

            // Only spawns; the entry is inserted once the task exists.
            worker.start().await?;
            workers.insert(subscription_id.to_string(), Arc::new(worker));
            (capacity, ack_mode)
        };

        info!(
            "Started monitoring '{}' (buffer {}, ack {})",
            subscription_id, capacity, ack_mode
        );
        self.sink.notify(MonitorEvent::MonitorStarted {
            subscription_id: subscription_id.to_string(),
        });
        Ok(())
    }

    /// Stops monitoring a subscription and waits for its worker to exit.
    ///
    /// Worker shutdown errors are logged; `monitor:stopped` is emitted regardless.
    pub async fn stop_monitor(&self, subscription_id: &str) -> Result<(), MonitorError> {
        let worker = {
            let mut workers = self.workers.write().await;
            workers.remove(subscription_id)
        };
        let Some(worker) = worker else {
            return Err(MonitorError::NotMonitoring(subscription_id.to_string()));
        };

        if let Err(e) = worker.stop().await {
            warn!("Error stopping monitor for '{}': {}", subscription_id, e);
        }

        info!("Stopped monitoring '{}'", subscription_id);
        self.sink.notify(MonitorEvent::MonitorStopped {
            subscription_id: subscription_id.to_string(),
        });
        Ok(())
    }

    /// Stops every running monitor. Returns the subscriptions that were stopped.
    pub async fn stop_all(&self) -> Vec<String> {
        let subscriptions = self.active_monitors().await;
        let mut stopped = Vec::with_capacity(subscriptions.len());
        for subscription_id in subscriptions {
            match self.stop_monitor(&subscription_id).await {
                Ok(()) => stopped.push(subscription_id),
                // Raced with another stop or a failed worker.
                Err(e) => log::debug!("Skipping '{}' during stop_all: {}", subscription_id, e),
            }
        }
        stopped
    }

    /// Returns a copy of the messages buffered for a subscription, oldest first.
    pub async fn get_buffered_messages(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<Message>, MonitorError> {
        let worker = self.worker(subscription_id).await?;
        Ok(worker.buffer().snapshot().await)
    }

    /// Clears the messages buffered for a subscription.
    pub async fn clear_buffer(&self, subscription_id: &str) -> Result<(), MonitorError> {
        let worker = self.worker(subscription_id).await?;
        worker.buffer().clear().await;
        Ok(())
    }

    /// Sets the acknowledgment mode for new workers and every running worker.
    pub async fn set_global_ack_mode(&self, mode: AckMode) {
        self.config.write().await.ack_mode = mode;

        let workers = self.workers.read().await;
        for worker in workers.values() {
            worker.set_ack_mode(mode);
        }
        info!(
            "Ack mode set to {} ({} running monitors updated)",
            mode,
            workers.len()
        );
    }

    /// Whether the subscription has a running monitor.
    pub async fn is_monitoring(&self, subscription_id: &str) -> bool {
        self.workers.read().await.contains_key(subscription_id)
    }

    /// The ids of all monitored subscriptions, sorted.
    pub async fn active_monitors(&self) -> Vec<String> {
        let workers = self.workers.read().await;
        let mut ids: Vec<String> = workers.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn worker(&self, subscription_id: &str) -> Result<Arc<StreamWorker>, MonitorError> {
        let workers = self.workers.read().await;
        workers
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| MonitorError::NotMonitoring(subscription_id.to_string()))
    }
}

impl std::fmt::Debug for MonitorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorRegistry").finish_non_exhaustive()
    }
}

/// Removes workers whose pull session failed.
struct Reaper {
    workers: Weak<Workers>,
    listeners: Arc<ExitListeners>,
}

#[async_trait]
impl WorkerExitHandler for Reaper {
    async fn on_worker_failed(&self, subscription_id: &str, generation: Uuid) {
        let Some(workers) = self.workers.upgrade() else {
            return;
        };

        let removed = {
            let mut workers = workers.write().await;
            match workers.get(subscription_id) {
                Some(worker) if worker.generation() == generation => {
                    workers.remove(subscription_id)
                }
                _ => None,
            }
        };

        if removed.is_none() {
            // Already stopped, or replaced by a newer worker.
            return;
        }
        info!(
            "Removed failed monitor for '{}' from the registry",
            subscription_id
        );

        let listeners: Vec<Arc<dyn WorkerExitHandler>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for listener in listeners {
            listener.on_worker_failed(subscription_id, generation).await;
        }
    }
}
