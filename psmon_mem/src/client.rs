use async_trait::async_trait;
use chrono::Utc;
use psmon_core::client::{
    ClientError, CreateSubscription, DeliveryType, MessagingClient, PullSession,
    SubscriptionInfo, TopicInfo,
};
use psmon_core::message::ReceivedMessage;
use psmon_core::naming::same_resource;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// A client operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `open_pull`
    OpenPull,
    /// `acknowledge`
    Acknowledge,
    /// `get_subscription`
    GetSubscription,
    /// `get_topic`
    GetTopic,
    /// `create_subscription`
    CreateSubscription,
    /// `delete_subscription`
    DeleteSubscription,
    /// `list_topics`
    ListTopics,
    /// `list_subscriptions`
    ListSubscriptions,
}

#[derive(Debug)]
struct SubscriptionState {
    info: SubscriptionInfo,
    queue: VecDeque<ReceivedMessage>,
    unacked: HashMap<String, ReceivedMessage>,
    acked: Vec<String>,
    broken: Option<ClientError>,
}

#[derive(Debug)]
struct PubSubData {
    connected: bool,
    topics: BTreeMap<String, TopicInfo>,
    subscriptions: BTreeMap<String, SubscriptionState>,
    faults: HashMap<Operation, ClientError>,
    subscription_faults: HashMap<(Operation, String), ClientError>,
    calls: HashMap<Operation, usize>,
    created: Vec<CreateSubscription>,
    deleted: Vec<String>,
    next_message: u64,
}

impl PubSubData {
    fn check(&mut self, operation: Operation, resource: Option<&str>) -> Result<(), ClientError> {
        *self.calls.entry(operation).or_default() += 1;
        if !self.connected {
            return Err(ClientError::NotConnected);
        }
        if let Some(resource) = resource
            && let Some(err) = self
                .subscription_faults
                .get(&(operation, resource.to_string()))
        {
            return Err(err.clone());
        }
        match self.faults.get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// An in-memory messaging service.
///
/// Messages published to a topic are queued on every pull subscription attached to it.
/// Failures can be injected per operation, or per operation and subscription, and every
/// call is counted so tests can assert which requests were made.
#[derive(Clone, Debug)]
pub struct InMemoryPubSub {
    data: Arc<Mutex<PubSubData>>,
    notify: Arc<Notify>,
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPubSub {
    /// Creates an empty, connected service.
    pub fn new() -> Self {
        log::debug!("Creating a new InMemoryPubSub");
        Self {
            data: Arc::new(Mutex::new(PubSubData {
                connected: true,
                topics: BTreeMap::new(),
                subscriptions: BTreeMap::new(),
                faults: HashMap::new(),
                subscription_faults: HashMap::new(),
                calls: HashMap::new(),
                created: Vec::new(),
                deleted: Vec::new(),
                next_message: 1,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Adds a topic.
    pub async fn add_topic(&self, topic_id: &str) {
        let mut data = self.data.lock().await;
        data.topics
            .insert(topic_id.to_string(), TopicInfo::new(topic_id));
    }

    /// Adds a pull subscription attached to `topic_id`.
    pub async fn add_pull_subscription(&self, subscription_id: &str, topic_id: &str) {
        self.add_subscription(SubscriptionInfo {
            id: subscription_id.to_string(),
            topic: topic_id.to_string(),
            delivery: DeliveryType::Pull,
            ack_deadline: Duration::from_secs(10),
            expiration_ttl: None,
        })
        .await;
    }

    /// Adds a push subscription attached to `topic_id`.
    pub async fn add_push_subscription(&self, subscription_id: &str, topic_id: &str) {
        self.add_subscription(SubscriptionInfo {
            id: subscription_id.to_string(),
            topic: topic_id.to_string(),
            delivery: DeliveryType::Push {
                endpoint: format!("https://example.invalid/push/{subscription_id}"),
            },
            ack_deadline: Duration::from_secs(10),
            expiration_ttl: None,
        })
        .await;
    }

    /// Adds a subscription as described.
    pub async fn add_subscription(&self, info: SubscriptionInfo) {
        let mut data = self.data.lock().await;
        data.subscriptions
            .insert(info.id.clone(), SubscriptionState::new(info));
    }

    /// Publishes a message to every pull subscription attached to `topic_id`.
    ///
    /// Returns the message id.
    pub async fn publish(
        &self,
        topic_id: &str,
        data: &[u8],
        attributes: HashMap<String, String>,
    ) -> Result<String, ClientError> {
        let mut store = self.data.lock().await;
        if !store.connected {
            return Err(ClientError::NotConnected);
        }
        if !store.topics.contains_key(topic_id) {
            return Err(ClientError::NotFound(topic_id.to_string()));
        }

        let sequence = store.next_message;
        store.next_message += 1;
        let message_id = sequence.to_string();
        let publish_time = Utc::now();

        for (subscription_id, state) in store.subscriptions.iter_mut() {
            if !same_resource(&state.info.topic, topic_id) || state.info.is_push() {
                continue;
            }
            state.queue.push_back(ReceivedMessage {
                ack_id: format!("{subscription_id}:{sequence}"),
                id: message_id.clone(),
                publish_time,
                data: data.to_vec(),
                attributes: attributes.clone(),
                delivery_attempt: None,
                ordering_key: None,
            });
        }
        drop(store);

        log::debug!("Published message {} to '{}'", message_id, topic_id);
        self.notify.notify_waiters();
        Ok(message_id)
    }

    /// Publishes a text payload with no attributes.
    pub async fn publish_text(&self, topic_id: &str, text: &str) -> Result<String, ClientError> {
        self.publish(topic_id, text.as_bytes(), HashMap::new()).await
    }

    /// Connects or disconnects the service. While disconnected every call fails.
    pub async fn set_connected(&self, connected: bool) {
        self.data.lock().await.connected = connected;
        self.notify.notify_waiters();
    }

    /// Makes every call of `operation` fail with `error`.
    pub async fn fail(&self, operation: Operation, error: ClientError) {
        self.data.lock().await.faults.insert(operation, error);
    }

    /// Makes calls of `operation` on one subscription fail with `error`.
    pub async fn fail_for(&self, operation: Operation, subscription_id: &str, error: ClientError) {
        self.data
            .lock()
            .await
            .subscription_faults
            .insert((operation, subscription_id.to_string()), error);
    }

    /// Removes all injected failures.
    pub async fn clear_faults(&self) {
        let mut data = self.data.lock().await;
        data.faults.clear();
        data.subscription_faults.clear();
    }

    /// Breaks the open pull sessions of a subscription: their next item is `error`.
    pub async fn break_session(&self, subscription_id: &str, error: ClientError) {
        if let Some(state) = self
            .data
            .lock()
            .await
            .subscriptions
            .get_mut(subscription_id)
        {
            state.broken = Some(error);
        }
        self.notify.notify_waiters();
    }

    /// How many times `operation` was called.
    pub async fn calls(&self, operation: Operation) -> usize {
        self.data
            .lock()
            .await
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Every successful subscription creation request, in order.
    pub async fn created_subscriptions(&self) -> Vec<CreateSubscription> {
        self.data.lock().await.created.clone()
    }

    /// Every successfully deleted subscription id, in order.
    pub async fn deleted_subscriptions(&self) -> Vec<String> {
        self.data.lock().await.deleted.clone()
    }

    /// Whether a subscription exists.
    pub async fn has_subscription(&self, subscription_id: &str) -> bool {
        self.data
            .lock()
            .await
            .subscriptions
            .contains_key(subscription_id)
    }

    /// Ids of the messages acknowledged on a subscription, in ack order.
    pub async fn acked_message_ids(&self, subscription_id: &str) -> Vec<String> {
        self.data
            .lock()
            .await
            .subscriptions
            .get(subscription_id)
            .map(|s| s.acked.clone())
            .unwrap_or_default()
    }

    /// Number of delivered but unacknowledged messages on a subscription.
    pub async fn unacked_count(&self, subscription_id: &str) -> usize {
        self.data
            .lock()
            .await
            .subscriptions
            .get(subscription_id)
            .map_or(0, |s| s.unacked.len())
    }
}

impl SubscriptionState {
    fn new(info: SubscriptionInfo) -> Self {
        Self {
            info,
            queue: VecDeque::new(),
            unacked: HashMap::new(),
            acked: Vec::new(),
            broken: None,
        }
    }
}

#[async_trait]
impl MessagingClient for InMemoryPubSub {
    async fn open_pull(&self, subscription_id: &str) -> Result<PullSession, ClientError> {
        {
            let mut data = self.data.lock().await;
            data.check(Operation::OpenPull, Some(subscription_id))?;
            let Some(state) = data.subscriptions.get(subscription_id) else {
                return Err(ClientError::NotFound(subscription_id.to_string()));
            };
            if state.info.is_push() {
                return Err(ClientError::FailedPrecondition(format!(
                    "'{subscription_id}' is a push subscription"
                )));
            }
        }

        let data = self.data.clone();
        let notify = self.notify.clone();
        let subscription_id = subscription_id.to_string();
        let session: PullSession = Box::pin(async_stream::stream! {
            loop {
                // Registered before checking the queue so a publish in between is not missed.
                let notified = notify.notified();
                let next = {
                    let mut data = data.lock().await;
                    let connected = data.connected;
                    match data.subscriptions.get_mut(&subscription_id) {
                        None => Some(Err(ClientError::NotFound(subscription_id.clone()))),
                        Some(_) if !connected => {
                            Some(Err(ClientError::Unavailable("connection lost".to_string())))
                        }
                        Some(state) => match state.broken.take() {
                            Some(err) => Some(Err(err)),
                            None => state.queue.pop_front().map(|message| {
                                state.unacked.insert(message.ack_id.clone(), message.clone());
                                Ok(message)
                            }),
                        },
                    }
                };

                match next {
                    Some(Ok(message)) => yield Ok(message),
                    Some(Err(err)) => {
                        yield Err(err);
                        break;
                    }
                    None => notified.await,
                }
            }
        });
        Ok(session)
    }

    async fn acknowledge(&self, subscription_id: &str, ack_id: &str) -> Result<(), ClientError> {
        let mut data = self.data.lock().await;
        data.check(Operation::Acknowledge, Some(subscription_id))?;
        let state = data
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| ClientError::NotFound(subscription_id.to_string()))?;
        let message = state
            .unacked
            .remove(ack_id)
            .ok_or_else(|| ClientError::FailedPrecondition(format!("unknown ack id '{ack_id}'")))?;
        state.acked.push(message.id);
        Ok(())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionInfo, ClientError> {
        let mut data = self.data.lock().await;
        data.check(Operation::GetSubscription, Some(subscription_id))?;
        data.subscriptions
            .get(subscription_id)
            .map(|s| s.info.clone())
            .ok_or_else(|| ClientError::NotFound(subscription_id.to_string()))
    }

    async fn get_topic(&self, topic_id: &str) -> Result<TopicInfo, ClientError> {
        let mut data = self.data.lock().await;
        data.check(Operation::GetTopic, None)?;
        data.topics
            .get(topic_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(topic_id.to_string()))
    }

    async fn create_subscription(
        &self,
        request: CreateSubscription,
    ) -> Result<SubscriptionInfo, ClientError> {
        let mut data = self.data.lock().await;
        data.check(Operation::CreateSubscription, Some(&request.id))?;
        if !data.topics.contains_key(&request.topic) {
            return Err(ClientError::NotFound(request.topic.clone()));
        }
        if data.subscriptions.contains_key(&request.id) {
            return Err(ClientError::AlreadyExists(request.id.clone()));
        }

        let info = SubscriptionInfo {
            id: request.id.clone(),
            topic: request.topic.clone(),
            delivery: DeliveryType::Pull,
            ack_deadline: request.ack_deadline,
            expiration_ttl: request.expiration_ttl,
        };
        data.subscriptions
            .insert(info.id.clone(), SubscriptionState::new(info.clone()));
        data.created.push(request);
        log::debug!("Created subscription '{}'", info.id);
        Ok(info)
    }

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), ClientError> {
        let mut data = self.data.lock().await;
        data.check(Operation::DeleteSubscription, Some(subscription_id))?;
        if data.subscriptions.remove(subscription_id).is_none() {
            return Err(ClientError::NotFound(subscription_id.to_string()));
        }
        data.deleted.push(subscription_id.to_string());
        drop(data);

        log::debug!("Deleted subscription '{}'", subscription_id);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn list_topics(&self) -> Result<Vec<TopicInfo>, ClientError> {
        let mut data = self.data.lock().await;
        data.check(Operation::ListTopics, None)?;
        Ok(data.topics.values().cloned().collect())
    }

    async fn list_subscriptions(&self) -> Result<Vec<SubscriptionInfo>, ClientError> {
        let mut data = self.data.lock().await;
        data.check(Operation::ListSubscriptions, None)?;
        Ok(data.subscriptions.values().map(|s| s.info.clone()).collect())
    }
}
