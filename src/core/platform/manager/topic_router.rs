/*
Topic Router

Decides which broker topics an identity listens on and turns the frames that arrive
on them into notification records.

- the private topic, built from a template with `{id}` replaced by the user id
- the broadcast topic shared by every identity

Subscriptions are keyed by topic name, so asking for the same topics twice on one
session never creates a second listener. Records are forwarded as decoded, without
ordering or dedup; that is the store's job.

The Callback Gate sits between the router and whoever consumes records. Closing it
waits for a delivery in progress and stops every later one.
*/

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::application::ports::output::broker_port::{BrokerMessage, BrokerResult, BrokerSession};
use crate::config::BrokerSettings;
use crate::core::platform::container::identity::Identity;
use crate::core::platform::container::notification::{NotificationChannel, NotificationPayload, NotificationRecord};

/// Consumer of live records
pub type NotificationCallback = Arc<dyn Fn(NotificationRecord) + Send + Sync>;

const ID_PLACEHOLDER: &str = "{id}";

/// Topic names, as configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTemplates {
    pub private: String,
    pub broadcast: String,
}

impl TopicTemplates {
    pub fn new(private: impl Into<String>, broadcast: impl Into<String>) -> Self {
        Self {
            private: private.into(),
            broadcast: broadcast.into(),
        }
    }

    pub fn from_settings(settings: &BrokerSettings) -> Self {
        Self::new(settings.private_topic.clone(), settings.broadcast_topic.clone())
    }

    pub fn private_topic(&self, identity: &Identity) -> String {
        self.private.replace(ID_PLACEHOLDER, &identity.user_id)
    }

    /// Topics an identity listens on, private first
    pub fn topics_for(&self, identity: &Identity) -> Vec<(String, NotificationChannel)> {
        vec![
            (self.private_topic(identity), NotificationChannel::Private),
            (self.broadcast.clone(), NotificationChannel::Broadcast),
        ]
    }
}

impl Default for TopicTemplates {
    fn default() -> Self {
        Self::from_settings(&BrokerSettings::default())
    }
}

#[derive(Debug, Clone)]
struct TopicSubscription {
    id: String,
    channel: NotificationChannel,
}

/// Subscription bookkeeping for one broker session
pub struct TopicRouter {
    templates: TopicTemplates,
    /// topic -> subscription
    subscriptions: HashMap<String, TopicSubscription>,
    next_id: u64,
}

impl TopicRouter {
    pub fn new(templates: TopicTemplates) -> Self {
        Self {
            templates,
            subscriptions: HashMap::new(),
            next_id: 0,
        }
    }

    /// Make sure `session` listens on exactly the identity's topics.
    ///
    /// Topics already subscribed are left alone; topics belonging to anything
    /// else are unsubscribed.
    pub async fn subscribe(&mut self, session: &mut dyn BrokerSession, identity: &Identity) -> BrokerResult<()> {
        let wanted = self.templates.topics_for(identity);

        let stale: Vec<String> = self
            .subscriptions
            .keys()
            .filter(|topic| !wanted.iter().any(|(name, _)| name == *topic))
            .cloned()
            .collect();
        for topic in stale {
            if let Some(subscription) = self.subscriptions.remove(&topic) {
                debug!("Unsubscribing {} ({})", topic, subscription.id);
                session.unsubscribe(&subscription.id).await?;
            }
        }

        for (topic, channel) in wanted {
            if self.subscriptions.contains_key(&topic) {
                continue;
            }
            let id = format!("sub-{}", self.next_id);
            self.next_id += 1;
            session.subscribe(&id, &topic).await?;
            debug!("Subscribed to {} as {}", topic, id);
            self.subscriptions.insert(topic, TopicSubscription { id, channel });
        }
        Ok(())
    }

    /// Unsubscribe every topic, before a graceful close
    pub async fn unsubscribe_all(&mut self, session: &mut dyn BrokerSession) -> BrokerResult<()> {
        for (_, subscription) in self.subscriptions.drain() {
            session.unsubscribe(&subscription.id).await?;
        }
        Ok(())
    }

    /// Forget subscriptions without talking to the broker; the session they lived on is gone
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }

    pub fn active_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.keys().cloned().collect();
        topics.sort();
        topics
    }

    fn lookup(&self, message: &BrokerMessage) -> Option<(&str, &TopicSubscription)> {
        if let Some(subscription_id) = message.subscription.as_deref() {
            let by_id = self
                .subscriptions
                .iter()
                .find(|(_, subscription)| subscription.id == subscription_id);
            if let Some((topic, subscription)) = by_id {
                return Some((topic.as_str(), subscription));
            }
        }
        self.subscriptions
            .get_key_value(&message.destination)
            .map(|(topic, subscription)| (topic.as_str(), subscription))
    }

    /// Decode a frame from one of our topics; anything else is dropped with a warning
    pub fn route(&self, message: &BrokerMessage) -> Option<NotificationRecord> {
        let Some((topic, subscription)) = self.lookup(message) else {
            warn!("Dropping message for unknown destination {}", message.destination);
            return None;
        };

        match serde_json::from_str::<NotificationPayload>(&message.body) {
            Ok(payload) => Some(payload.into_record(subscription.channel, topic)),
            Err(e) => {
                warn!("Dropping malformed notification on {}: {}", topic, e);
                None
            }
        }
    }
}

/// Switchable hand-off to the live-push consumer
#[derive(Clone)]
pub struct CallbackGate {
    callback: Arc<Mutex<Option<NotificationCallback>>>,
}

impl CallbackGate {
    pub fn open(callback: NotificationCallback) -> Self {
        Self {
            callback: Arc::new(Mutex::new(Some(callback))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<NotificationCallback>> {
        self.callback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a record to the consumer; false once the gate is closed.
    ///
    /// The consumer runs under the gate lock and must not close the gate itself.
    pub fn deliver(&self, record: NotificationRecord) -> bool {
        let guard = self.lock();
        match guard.as_ref() {
            Some(callback) => {
                callback(record);
                true
            }
            None => false,
        }
    }

    pub fn replace(&self, callback: NotificationCallback) {
        *self.lock() = Some(callback);
    }

    pub fn close(&self) {
        self.lock().take();
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }
}
