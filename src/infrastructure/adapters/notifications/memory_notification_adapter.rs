/*
In-Memory Notification Adapter

A process-local stand-in for the notification backend, implementing the same port
as the HTTP adapter. It keeps notifications per user id and can be wired to an
InMemoryBroker, in which case it pushes like the real backend does:

- `notify` stores a notification and publishes it on the user's private topic
- `send_broadcast` publishes an id-less announcement on the broadcast topic

Failure toggles and pause switches for fetches and confirmations make the unhappy
paths and the in-flight windows reproducible in tests.
*/

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::application::ports::output::notification_port::{
    BroadcastRequest, NotificationApiPort, NotificationPortError, NotificationPortResult,
};
use crate::core::platform::container::identity::Identity;
use crate::core::platform::container::notification::{NotificationDetails, NotificationId, NotificationPayload};
use crate::core::platform::manager::topic_router::TopicTemplates;
use crate::infrastructure::adapters::broker::memory_broker::InMemoryBroker;

#[derive(Default)]
struct ApiState {
    /// user id -> notifications, oldest first
    notifications: HashMap<String, Vec<NotificationPayload>>,
    next_id: i64,
    fetch_failure: Option<NotificationPortError>,
    mark_read_failure: Option<NotificationPortError>,
    mark_read_calls: Vec<NotificationId>,
    fetch_calls: usize,
    broadcasts: Vec<BroadcastRequest>,
}

#[derive(Clone)]
pub struct InMemoryNotificationApi {
    state: Arc<Mutex<ApiState>>,
    /// true while confirmations are held back
    paused: Arc<watch::Sender<bool>>,
    /// true while fetches are held back
    fetch_paused: Arc<watch::Sender<bool>>,
    broker: Option<(InMemoryBroker, TopicTemplates)>,
}

impl InMemoryNotificationApi {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        let (fetch_paused, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(ApiState {
                next_id: 1,
                ..ApiState::default()
            })),
            paused: Arc::new(paused),
            fetch_paused: Arc::new(fetch_paused),
            broker: None,
        }
    }

    /// Push new notifications through `broker`, like the real backend
    pub fn with_broker(mut self, broker: InMemoryBroker, templates: TopicTemplates) -> Self {
        self.broker = Some((broker, templates));
        self
    }

    fn lock(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, user_id: &str, title: &str, message: &str, created_at: DateTime<Utc>) -> (NotificationId, NotificationPayload) {
        let mut state = self.lock();
        let id = NotificationId::from(state.next_id);
        state.next_id += 1;

        let payload = NotificationPayload {
            id: Some(id.clone()),
            title: title.to_string(),
            message: message.to_string(),
            created_at,
            is_read: false,
            details: NotificationDetails {
                user_id: user_id.parse().ok(),
                kind: Some("SYSTEM".to_string()),
                delivery_channel: Some("IN_APP".to_string()),
                ..NotificationDetails::default()
            },
        };
        state
            .notifications
            .entry(user_id.to_string())
            .or_default()
            .push(payload.clone());
        (id, payload)
    }

    /// Store a notification without pushing it; returns its id
    pub fn seed(&self, user_id: &str, title: &str, message: &str) -> NotificationId {
        self.seed_at(user_id, title, message, Utc::now())
    }

    pub fn seed_at(&self, user_id: &str, title: &str, message: &str, created_at: DateTime<Utc>) -> NotificationId {
        self.store(user_id, title, message, created_at).0
    }

    /// Store a notification and push it on the user's private topic
    pub fn notify(&self, user_id: &str, title: &str, message: &str) -> NotificationId {
        let (id, payload) = self.store(user_id, title, message, Utc::now());
        if let Some((broker, templates)) = &self.broker {
            let topic = templates.private.replace("{id}", user_id);
            let _ = broker.publish_json(&topic, &payload);
        }
        id
    }

    pub fn fail_fetch(&self, failure: Option<NotificationPortError>) {
        self.lock().fetch_failure = failure;
    }

    pub fn fail_mark_read(&self, failure: Option<NotificationPortError>) {
        self.lock().mark_read_failure = failure;
    }

    /// Hold every mark-read confirmation until `resume_mark_read`
    pub fn pause_mark_read(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume_mark_read(&self) {
        self.paused.send_replace(false);
    }

    /// Hold every fetch until `resume_fetch`
    pub fn pause_fetch(&self) {
        self.fetch_paused.send_replace(true);
    }

    pub fn resume_fetch(&self) {
        self.fetch_paused.send_replace(false);
    }

    pub fn mark_read_calls(&self) -> Vec<NotificationId> {
        self.lock().mark_read_calls.clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.lock().fetch_calls
    }

    pub fn broadcasts(&self) -> Vec<BroadcastRequest> {
        self.lock().broadcasts.clone()
    }

    /// Server-side read flag of a stored notification
    pub fn is_read(&self, id: &NotificationId) -> Option<bool> {
        self.lock()
            .notifications
            .values()
            .flatten()
            .find(|payload| payload.id.as_ref() == Some(id))
            .map(|payload| payload.is_read)
    }
}

impl Default for InMemoryNotificationApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationApiPort for InMemoryNotificationApi {
    async fn fetch_notifications(&self, identity: &Identity) -> NotificationPortResult<Vec<NotificationPayload>> {
        self.lock().fetch_calls += 1;

        let mut paused = self.fetch_paused.subscribe();
        let _ = paused.wait_for(|held| !*held).await;

        let state = self.lock();
        if let Some(failure) = state.fetch_failure.clone() {
            return Err(failure);
        }
        Ok(state.notifications.get(&identity.user_id).cloned().unwrap_or_default())
    }

    async fn mark_read(&self, id: &NotificationId) -> NotificationPortResult<()> {
        self.lock().mark_read_calls.push(id.clone());

        let mut paused = self.paused.subscribe();
        let _ = paused.wait_for(|held| !*held).await;

        let mut state = self.lock();
        if let Some(failure) = state.mark_read_failure.clone() {
            return Err(failure);
        }
        let payload = state
            .notifications
            .values_mut()
            .flatten()
            .find(|payload| payload.id.as_ref() == Some(id))
            .ok_or_else(|| NotificationPortError::NotFound(format!("Notification not found with id: {}", id)))?;
        payload.is_read = true;
        Ok(())
    }

    async fn unread_count(&self, identity: &Identity) -> NotificationPortResult<u64> {
        let state = self.lock();
        let count = state
            .notifications
            .get(&identity.user_id)
            .map(|list| list.iter().filter(|payload| !payload.is_read).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn send_broadcast(&self, request: &BroadcastRequest) -> NotificationPortResult<()> {
        request.validate()?;
        self.lock().broadcasts.push(request.clone());

        if let Some((broker, templates)) = &self.broker {
            let payload = NotificationPayload {
                id: None,
                title: request.title.clone(),
                message: request.message.clone(),
                created_at: Utc::now(),
                is_read: false,
                details: NotificationDetails {
                    kind: Some(request.kind.clone()),
                    delivery_channel: Some(request.channel.clone()),
                    reference_type: Some(request.reference_type.clone()),
                    reference_id: Some(request.reference_id),
                    ..NotificationDetails::default()
                },
            };
            broker
                .publish_json(&templates.broadcast, &payload)
                .map_err(|e| NotificationPortError::InvalidResponse(e.to_string()))?;
        }
        Ok(())
    }
}
