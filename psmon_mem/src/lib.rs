//! # psmon memory backend
//!
//! In-memory implementations of psmon's collaborators, primarily for testing and demos.
//!
//! - [`InMemoryPubSub`]: a [`MessagingClient`](psmon_core::client::MessagingClient) with
//!   topics, pull subscriptions, failure injection and call counters
//! - [`RecordingEventSink`]: an [`EventSink`](psmon_core::event::EventSink) that records
//!   notifications for assertions
//!
//! ```ignore
//! use std::sync::Arc;
//! use psmon_core::prelude::*;
//! use psmon_mem::{InMemoryPubSub, RecordingEventSink};
//!
//! let pubsub = InMemoryPubSub::new();
//! pubsub.add_topic("orders").await;
//! pubsub.add_pull_subscription("orders-sub", "orders").await;
//!
//! let sink = RecordingEventSink::new();
//! let service = MonitorService::new(Arc::new(pubsub.clone()), Arc::new(sink.clone()), MonitorConfig::default());
//! service.start_monitor("orders-sub").await?;
//! pubsub.publish_text("orders", "hello").await?;
//! ```

#![deny(missing_docs)]

mod client;
mod sink;

pub use client::*;
pub use sink::*;
