//! # psmon core
//!
//! Live message monitoring for a managed publish/subscribe service.
//!
//! - [`buffer::MessageBuffer`]: bounded FIFO store of received messages
//! - [`worker::StreamWorker`]: supervised pull task for one subscription
//! - [`registry::MonitorRegistry`]: at most one worker per subscription
//! - [`bridge::TopicMonitorBridge`]: topic monitoring through temporary subscriptions
//! - [`sync::ResourceSynchronizer`]: cached topic and subscription catalogs
//! - [`service::MonitorService`]: the operations exposed to a presentation layer
//!
//! The messaging service is reached through the [`client::MessagingClient`] trait and
//! notifications leave through an [`event::EventSink`].

#![deny(missing_docs)]

pub mod bridge;
pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod naming;
pub mod registry;
pub mod service;
pub mod sync;
pub mod worker;

pub mod prelude {
    //! The prelude module for the `psmon_core` crate.
    pub use super::bridge::{SubscriptionSource, TopicLink, TopicMonitorBridge, TopicMonitorStart};
    pub use super::buffer::MessageBuffer;
    pub use super::client::{
        ClientError, CreateSubscription, DeliveryType, MessageStream, MessagingClient,
        PullSession, SubscriptionInfo, TopicInfo,
    };
    pub use super::config::MonitorConfig;
    pub use super::error::MonitorError;
    pub use super::event::{ChannelEventSink, EventSink, MonitorEvent, ResourceKind, SyncFailure};
    pub use super::message::{AckMode, Message, ReceivedMessage};
    pub use super::registry::MonitorRegistry;
    pub use super::service::MonitorService;
    pub use super::sync::{ResourceSynchronizer, SyncReport};
    pub use super::worker::{StreamWorker, WorkerExitHandler};
}
