//! Configuration for monitor workers and temporary topic subscriptions.

use crate::message::AckMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the monitoring subsystem.
///
/// Buffer capacity applies to workers started after it changes. Ack mode applies to new
/// workers and is also propagated to running ones.
///
/// Hosts usually embed this in their own settings file; every field has a default so a
/// partial fragment is enough:
///
/// ```
/// use psmon_core::config::MonitorConfig;
///
/// let config = MonitorConfig::from_json(r#"{ "buffer_capacity": 100, "ack_mode": "manual" }"#)?;
/// assert_eq!(config.buffer_capacity, 100);
/// assert_eq!(config.temp_subscription_prefix, "ps-gui-mon-");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Maximum messages kept per monitored subscription. Older messages are evicted first.
    pub buffer_capacity: usize,

    /// Default acknowledgment mode.
    pub ack_mode: AckMode,

    /// Inactivity TTL (seconds) set on temporary subscriptions.
    ///
    /// Deleting a temporary subscription on stop is best-effort. This TTL is what guarantees
    /// the service eventually reclaims it.
    pub temp_subscription_ttl_secs: u64,

    /// Ack deadline (seconds) set on temporary subscriptions.
    pub temp_ack_deadline_secs: u64,

    /// Delay (milliseconds) between stopping a topic monitor's worker and deleting its
    /// temporary subscription, so in-flight receives and acks can settle.
    pub teardown_delay_ms: u64,

    /// Prefix of temporary subscription ids.
    pub temp_subscription_prefix: String,

    /// Maximum number of topic-name characters embedded in a temporary subscription id.
    pub topic_name_max_len: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 500,
            ack_mode: AckMode::Auto,
            temp_subscription_ttl_secs: 24 * 60 * 60,
            temp_ack_deadline_secs: 10,
            teardown_delay_ms: 500,
            temp_subscription_prefix: "ps-gui-mon-".to_string(),
            topic_name_max_len: 20,
        }
    }
}

impl MonitorConfig {
    /// Parses a JSON settings fragment. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The TTL set on temporary subscriptions.
    pub fn temp_subscription_ttl(&self) -> Duration {
        Duration::from_secs(self.temp_subscription_ttl_secs)
    }

    /// The ack deadline set on temporary subscriptions.
    pub fn temp_ack_deadline(&self) -> Duration {
        Duration::from_secs(self.temp_ack_deadline_secs)
    }

    /// The delay before deleting a temporary subscription on stop.
    pub fn teardown_delay(&self) -> Duration {
        Duration::from_millis(self.teardown_delay_ms)
    }
}
