//! This module defines the `MessagingClient` trait, the interface psmon consumes from the
//! messaging service. It covers pull sessions and acknowledgments, resource metadata lookups,
//! and creation/deletion of the subscriptions used for topic monitoring.

use crate::message::ReceivedMessage;
use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

/// Errors reported by a messaging client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The resource does not exist (or no longer exists)
    #[error("Resource not found: {0}")]
    NotFound(String),
    /// The resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),
    /// The service refused the operation in the resource's current state
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),
    /// There is no connection to the service
    #[error("Not connected")]
    NotConnected,
    /// The service could not be reached or the session broke
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    /// Any other service error
    #[error("{0}")]
    Other(String),
}

impl ClientError {
    /// Whether the error means the resource is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    /// Whether the error means the resource is still referenced or otherwise busy.
    pub fn is_failed_precondition(&self) -> bool {
        matches!(self, ClientError::FailedPrecondition(_))
    }
}

/// A stream of messages pulled from a subscription.
///
/// The stream suspends until the next message is available. It ends (or yields an error) when
/// the session breaks.
pub trait MessageStream: Stream<Item = Result<ReceivedMessage, ClientError>> + Send {}

impl<T> MessageStream for T where T: Stream<Item = Result<ReceivedMessage, ClientError>> + Send {}

/// An open pull session.
pub type PullSession = Pin<Box<dyn MessageStream>>;

/// How a subscription delivers messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeliveryType {
    /// Messages are pulled by subscribers
    Pull,
    /// Messages are pushed to an HTTP endpoint
    Push {
        /// The endpoint receiving pushed messages
        endpoint: String,
    },
}

/// Topic metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    /// Topic identifier, short (`orders`) or fully qualified (`projects/p/topics/orders`)
    pub id: String,
    /// Message retention configured on the topic, if any
    pub message_retention: Option<Duration>,
}

impl TopicInfo {
    /// Creates topic metadata with no retention setting.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message_retention: None,
        }
    }
}

/// Subscription metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Subscription identifier
    pub id: String,
    /// The topic this subscription is attached to
    pub topic: String,
    /// Pull or push delivery
    pub delivery: DeliveryType,
    /// Acknowledgment deadline
    pub ack_deadline: Duration,
    /// Inactivity TTL after which the service deletes the subscription, if any
    pub expiration_ttl: Option<Duration>,
}

impl SubscriptionInfo {
    /// Whether this subscription delivers by push.
    pub fn is_push(&self) -> bool {
        matches!(self.delivery, DeliveryType::Push { .. })
    }
}

/// Parameters for creating a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSubscription {
    /// Identifier of the new subscription
    pub id: String,
    /// Topic the subscription attaches to
    pub topic: String,
    /// Acknowledgment deadline
    pub ack_deadline: Duration,
    /// Inactivity TTL. Temporary subscriptions always set this.
    pub expiration_ttl: Option<Duration>,
}

/// The messaging-service operations psmon depends on.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Opens a pull session on a subscription.
    async fn open_pull(&self, subscription_id: &str) -> Result<PullSession, ClientError>;

    /// Acknowledges a message previously received on `subscription_id`.
    async fn acknowledge(&self, subscription_id: &str, ack_id: &str) -> Result<(), ClientError>;

    /// Fetches subscription metadata.
    async fn get_subscription(&self, subscription_id: &str)
    -> Result<SubscriptionInfo, ClientError>;

    /// Fetches topic metadata.
    async fn get_topic(&self, topic_id: &str) -> Result<TopicInfo, ClientError>;

    /// Creates a subscription.
    async fn create_subscription(
        &self,
        request: CreateSubscription,
    ) -> Result<SubscriptionInfo, ClientError>;

    /// Deletes a subscription.
    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), ClientError>;

    /// Lists every topic in the current project.
    async fn list_topics(&self) -> Result<Vec<TopicInfo>, ClientError>;

    /// Lists every subscription in the current project.
    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionInfo>, ClientError>;
}
