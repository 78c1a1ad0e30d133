//! This module defines the `Message` record kept in monitor buffers, the `ReceivedMessage`
//! delivered by a pull session, and the `AckMode` policy applied to received messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

/// A message received from a subscription.
///
/// Messages are immutable once constructed. Buffers hand out clones, never live references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The server-assigned message id
    pub id: String,

    /// The time at which the message was published to its topic
    pub publish_time: DateTime<Utc>,

    /// The local time at which the monitor received the message
    pub receive_time: DateTime<Utc>,

    /// Decoded payload bytes
    pub data: Vec<u8>,

    /// Message attributes. Order is not significant.
    pub attributes: HashMap<String, String>,

    /// Number of delivery attempts, when the subscription has a dead letter policy
    pub delivery_attempt: Option<u32>,

    /// Ordering key, if the publisher set one
    pub ordering_key: Option<String>,
}

impl Message {
    /// Builds the buffered record for a message received at `receive_time`.
    pub fn from_received(received: &ReceivedMessage, receive_time: DateTime<Utc>) -> Self {
        Self {
            id: received.id.clone(),
            publish_time: received.publish_time,
            receive_time,
            data: received.data.clone(),
            attributes: received.attributes.clone(),
            delivery_attempt: received.delivery_attempt,
            ordering_key: received.ordering_key.clone(),
        }
    }

    /// Returns the payload as text, replacing invalid UTF-8 sequences.
    pub fn data_as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// A message as handed out by a pull session, before it is buffered.
///
/// Carries the `ack_id` needed to acknowledge it on the subscription it was pulled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Opaque acknowledgment handle
    pub ack_id: String,
    /// The server-assigned message id
    pub id: String,
    /// Publish timestamp
    pub publish_time: DateTime<Utc>,
    /// Payload bytes
    pub data: Vec<u8>,
    /// Message attributes
    pub attributes: HashMap<String, String>,
    /// Delivery attempt counter, if reported
    pub delivery_attempt: Option<u32>,
    /// Ordering key, if any
    pub ordering_key: Option<String>,
}

/// Acknowledgment policy applied by stream workers to newly received messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckMode {
    /// Acknowledge each message immediately after it is buffered.
    #[default]
    Auto,
    /// Leave messages unacknowledged. Redelivery follows the subscription's ack deadline.
    Manual,
}

impl AckMode {
    /// Whether messages are acknowledged on receipt.
    pub fn is_auto(self) -> bool {
        matches!(self, AckMode::Auto)
    }
}

impl std::fmt::Display for AckMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckMode::Auto => write!(f, "auto"),
            AckMode::Manual => write!(f, "manual"),
        }
    }
}
