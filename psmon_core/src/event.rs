//! Notifications emitted to the presentation layer.
//!
//! The core never talks to a UI directly. Every component holds an [`EventSink`] and reports
//! through it; [`ChannelEventSink`] forwards events to a task that owns the presentation layer.

use crate::client::{SubscriptionInfo, TopicInfo};
use crate::message::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The kinds of remote resources the synchronizer caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// The topic catalog
    Topics,
    /// The subscription catalog
    Subscriptions,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Topics => write!(f, "topics"),
            ResourceKind::Subscriptions => write!(f, "subscriptions"),
        }
    }
}

/// One failed fetch within a resource sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// The resource type whose fetch failed
    pub resource: ResourceKind,
    /// The error reported by the client
    pub error: String,
}

/// A notification emitted by the monitoring subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum MonitorEvent {
    /// A message was received and buffered
    #[serde(rename = "message:received")]
    MessageReceived {
        /// The subscription the message came from
        subscription_id: String,
        /// The buffered record
        message: Message,
    },
    /// A subscription monitor started
    #[serde(rename = "monitor:started")]
    MonitorStarted {
        /// The monitored subscription
        subscription_id: String,
    },
    /// A subscription monitor stopped
    #[serde(rename = "monitor:stopped")]
    MonitorStopped {
        /// The subscription no longer monitored
        subscription_id: String,
    },
    /// A running monitor failed and was removed
    #[serde(rename = "monitor:error")]
    MonitorError {
        /// The affected subscription
        subscription_id: String,
        /// What went wrong
        error: String,
    },
    /// The resource cache was refreshed. Only the kinds that fetched successfully are present.
    #[serde(rename = "resources:updated")]
    ResourcesUpdated {
        /// The new topic catalog, if its fetch succeeded
        topics: Option<Vec<TopicInfo>>,
        /// The new subscription catalog, if its fetch succeeded
        subscriptions: Option<Vec<SubscriptionInfo>>,
    },
    /// One or both resource fetches failed
    #[serde(rename = "resources:sync-error")]
    ResourcesSyncError {
        /// The failed fetches
        failures: Vec<SyncFailure>,
    },
}

impl MonitorEvent {
    /// The event name used by the presentation layer.
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::MessageReceived { .. } => "message:received",
            MonitorEvent::MonitorStarted { .. } => "monitor:started",
            MonitorEvent::MonitorStopped { .. } => "monitor:stopped",
            MonitorEvent::MonitorError { .. } => "monitor:error",
            MonitorEvent::ResourcesUpdated { .. } => "resources:updated",
            MonitorEvent::ResourcesSyncError { .. } => "resources:sync-error",
        }
    }

    /// The event payload as JSON, for bridges exposing a `notify(name, payload)` API.
    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("payload").unwrap_or(serde_json::Value::Null)
            }
            Ok(_) => serde_json::Value::Null,
            Err(e) => {
                log::warn!("Failed to serialize '{}' payload: {}", self.name(), e);
                serde_json::Value::Null
            }
        }
    }

    /// The subscription this event concerns, if any.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            MonitorEvent::MessageReceived {
                subscription_id, ..
            }
            | MonitorEvent::MonitorStarted { subscription_id }
            | MonitorEvent::MonitorStopped { subscription_id }
            | MonitorEvent::MonitorError {
                subscription_id, ..
            } => Some(subscription_id),
            MonitorEvent::ResourcesUpdated { .. } | MonitorEvent::ResourcesSyncError { .. } => None,
        }
    }
}

/// Receives notifications from the monitoring subsystem.
///
/// Implementations must not block: `notify` is called from worker tasks between receives.
pub trait EventSink: Send + Sync {
    /// Delivers a notification.
    fn notify(&self, event: MonitorEvent);
}

/// An [`EventSink`] that forwards events over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<MonitorEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiver its events are delivered to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MonitorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn notify(&self, event: MonitorEvent) {
        if let Err(e) = self.tx.send(event) {
            log::debug!("Dropping '{}' notification: receiver closed", e.0.name());
        }
    }
}
