//! Errors returned by monitoring operations.

use crate::client::ClientError;

/// Errors that can occur when starting, stopping or querying monitors.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The messaging client is not connected
    #[error("Not connected")]
    NotConnected,
    /// Push subscriptions deliver via callback and cannot be pulled
    #[error(
        "Subscription '{0}' is a push subscription; push subscriptions cannot be monitored, they deliver via callback, not pull"
    )]
    PushSubscription(String),
    /// The subscription already has an active monitor
    #[error("Already monitoring subscription '{0}'")]
    AlreadyMonitoring(String),
    /// The subscription has no active monitor
    #[error("Not monitoring subscription '{0}'")]
    NotMonitoring(String),
    /// The topic already has an active topic monitor
    #[error("Already monitoring topic '{0}'")]
    TopicAlreadyMonitored(String),
    /// The subscription is attached to a different topic
    #[error("Subscription '{subscription}' is attached to topic '{actual}', not '{expected}'")]
    TopicMismatch {
        /// The subscription requested
        subscription: String,
        /// The topic requested
        expected: String,
        /// The topic the subscription is actually attached to
        actual: String,
    },
    /// A stream worker was started twice
    #[error("Stream worker for '{0}' is already running")]
    WorkerAlreadyRunning(String),
    /// A stream worker was stopped while not running
    #[error("Stream worker for '{0}' is not running")]
    WorkerNotRunning(String),
    /// The worker task panicked before it could be joined
    #[error("Stream worker task for '{0}' panicked: {1}")]
    WorkerPanicked(String, String),
    /// The messaging service returned an error
    #[error("Messaging service error: {0}")]
    Client(ClientError),
}

impl From<ClientError> for MonitorError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotConnected => MonitorError::NotConnected,
            other => MonitorError::Client(other),
        }
    }
}
