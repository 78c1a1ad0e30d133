//! Naming convention for temporary topic-monitor subscriptions.
//!
//! A temporary subscription for topic `orders` is named `ps-gui-mon-orders-<suffix>`, where
//! the topic part is truncated to a configured number of characters and the suffix is unique.

use uuid::Uuid;

/// The last path segment of a resource id.
///
/// `projects/p/topics/orders` and `orders` both yield `orders`.
pub fn short_name(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

/// Whether two ids name the same resource.
///
/// Two fully qualified ids must match exactly, so `orders` in one project never matches
/// `orders` in another. When either side is a bare name only the last segments are compared.
pub fn same_resource(a: &str, b: &str) -> bool {
    if a.contains('/') && b.contains('/') {
        a == b
    } else {
        short_name(a) == short_name(b)
    }
}

/// The id prefix shared by all temporary subscriptions of a topic.
pub fn temp_subscription_prefix(prefix: &str, topic_id: &str, max_topic_len: usize) -> String {
    let topic: String = short_name(topic_id).chars().take(max_topic_len).collect();
    format!("{prefix}{topic}-")
}

/// Synthesizes a new temporary subscription id for a topic.
pub fn new_temp_subscription_id(prefix: &str, topic_id: &str, max_topic_len: usize) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}",
        temp_subscription_prefix(prefix, topic_id, max_topic_len),
        &suffix[..8]
    )
}

/// Whether `subscription_id` follows the temporary naming convention for `topic_id`.
pub fn is_temp_subscription_for(
    prefix: &str,
    topic_id: &str,
    max_topic_len: usize,
    subscription_id: &str,
) -> bool {
    let expected = temp_subscription_prefix(prefix, topic_id, max_topic_len);
    short_name(subscription_id)
        .strip_prefix(expected.as_str())
        .is_some_and(|suffix| !suffix.is_empty())
}
