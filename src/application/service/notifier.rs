/*
Notification Center

Application service that owns the notification pipeline for one signed-in identity
at a time. Sign-in and sign-out are the only lifecycle events; nothing here is tied
to what is on screen.

sign_in:
- any previous identity is signed out first
- the notification list is fetched (a failure is reported but the session stays up)
- the broker connection is opened with a callback that pushes into the store
- a periodic refresh re-fetches the authoritative list

sign_out:
- no live push reaches the store once the broker connection is down
- the refresh task stops
- the store is emptied so nothing leaks into the next identity's session

A refresh that completes after its identity signed out is thrown away.
*/

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::application::ports::output::broker_port::BrokerTransport;
use crate::application::ports::output::notification_port::{BroadcastRequest, NotificationApiPort, NotificationPortError};
use crate::config::Settings;
use crate::core::platform::container::category::Presentation;
use crate::core::platform::container::identity::Identity;
use crate::core::platform::container::notification::{
    format_relative_time, NotificationChannel, NotificationId, NotificationRecord,
};
use crate::core::platform::manager::category_resolver::CategoryResolver;
use crate::core::platform::manager::connection_manager::{ConnectionManager, ConnectionState};
use crate::core::platform::manager::notification_store::NotificationStore;
use crate::core::platform::manager::read_state_coordinator::{MarkAllReadSummary, MarkReadOutcome, ReadStateCoordinator};
use crate::core::platform::manager::topic_router::{NotificationCallback, TopicTemplates};
use crate::error::PipelineError;
use crate::infrastructure::adapters::broker::websocket_transport::StompWebSocketTransport;
use crate::infrastructure::adapters::notifications::http_notification_adapter::HttpNotificationAdapter;

/// Source label for records that came from the REST list
const FETCH_SOURCE: &str = "rest";

/// One notification ready to render
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationCard {
    pub record: NotificationRecord,
    pub presentation: Presentation,
    pub relative_time: String,
}

/// Fetches snapshots into the store for whichever identity is current
#[derive(Clone)]
struct Refresher {
    store: Arc<NotificationStore>,
    api: Arc<dyn NotificationApiPort>,
    current: Arc<RwLock<Option<Identity>>>,
}

impl Refresher {
    /// Returns the number of records in the new snapshot, or None if it was stale
    async fn refresh(&self, identity: &Identity) -> Result<Option<usize>, NotificationPortError> {
        let payloads = self.api.fetch_notifications(identity).await?;
        let records: Vec<NotificationRecord> = payloads
            .into_iter()
            .map(|payload| payload.into_record(NotificationChannel::Private, FETCH_SOURCE))
            .collect();

        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref() != Some(identity) {
            debug!("Discarding notification list fetched for {}", identity);
            return Ok(None);
        }
        let count = records.len();
        self.store.replace_from_fetch(records);
        Ok(Some(count))
    }
}

struct RefreshTask {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct NotificationCenter {
    store: Arc<NotificationStore>,
    api: Arc<dyn NotificationApiPort>,
    connections: ConnectionManager,
    coordinator: ReadStateCoordinator,
    refresher: Refresher,
    refresh_interval: Option<Duration>,
    refresh_task: Mutex<Option<RefreshTask>>,
}

impl NotificationCenter {
    pub fn new(settings: &Settings, api: Arc<dyn NotificationApiPort>, transport: Arc<dyn BrokerTransport>) -> Self {
        let store = Arc::new(NotificationStore::new());
        let connections = ConnectionManager::new(
            transport,
            TopicTemplates::from_settings(&settings.broker),
            settings.reconnect.clone(),
        );

        Self {
            coordinator: ReadStateCoordinator::new(store.clone(), api.clone()),
            refresher: Refresher {
                store: store.clone(),
                api: api.clone(),
                current: Arc::new(RwLock::new(None)),
            },
            store,
            api,
            connections,
            refresh_interval: settings.refresh.interval(),
            refresh_task: Mutex::new(None),
        }
    }

    /// Wire the HTTP backend and the STOMP broker from settings
    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        let api = HttpNotificationAdapter::new(&settings.api)?;
        let transport = StompWebSocketTransport::new(settings.broker.clone());
        Ok(Self::new(settings, Arc::new(api), Arc::new(transport)))
    }

    pub fn identity(&self) -> Option<Identity> {
        self.refresher
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_identity(&self) -> Result<Identity, PipelineError> {
        self.identity().ok_or(PipelineError::NotSignedIn)
    }

    /// Start the pipeline for `identity`.
    ///
    /// An error from the initial fetch is returned, but the identity stays signed in
    /// and live pushes and periodic refreshes keep running.
    pub async fn sign_in(&self, identity: Identity) -> Result<(), PipelineError> {
        let mut refresh_task = self.refresh_task.lock().await;

        match self.identity() {
            Some(current) if current == identity => {
                debug!("{} already signed in", identity);
                self.connections.connect(identity.clone(), self.live_callback()).await;
                return self.fetch_into_store(&identity).await;
            }
            Some(current) => {
                info!("Switching identity from {} to {}", current, identity);
                self.stop(&mut refresh_task).await;
            }
            None => {}
        }

        *self.refresher.current.write().unwrap_or_else(PoisonError::into_inner) = Some(identity.clone());
        info!("Signed in as {}", identity);

        let initial = self.fetch_into_store(&identity).await;
        self.connections.connect(identity.clone(), self.live_callback()).await;
        *refresh_task = self.spawn_refresh(identity);

        initial
    }

    pub async fn sign_out(&self) {
        let mut refresh_task = self.refresh_task.lock().await;
        self.stop(&mut refresh_task).await;
    }

    async fn stop(&self, refresh_task: &mut Option<RefreshTask>) {
        let previous = self.refresher.current.write().unwrap_or_else(PoisonError::into_inner).take();

        self.connections.disconnect().await;
        if let Some(task) = refresh_task.take() {
            let _ = task.shutdown.send(());
            if let Err(e) = task.handle.await {
                warn!("Refresh task ended abnormally: {}", e);
            }
        }
        self.store.reset();

        if let Some(identity) = previous {
            info!("Signed out {}", identity);
        }
    }

    fn live_callback(&self) -> NotificationCallback {
        let store = self.store.clone();
        Arc::new(move |record: NotificationRecord| {
            let id = record.id.clone();
            if store.push_live(record) {
                debug!("Live notification {} stored", id);
            } else {
                debug!("Live notification {} already known", id);
            }
        })
    }

    fn spawn_refresh(&self, identity: Identity) -> Option<RefreshTask> {
        let period = self.refresh_interval?;
        let refresher = self.refresher.clone();
        let (shutdown, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tokio::select! {
                            result = refresher.refresh(&identity) => {
                                if let Err(e) = result {
                                    warn!("Periodic refresh for {} failed: {}", identity, e);
                                }
                            }
                            _ = shutdown_rx.recv() => break,
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Some(RefreshTask { shutdown, handle })
    }

    async fn fetch_into_store(&self, identity: &Identity) -> Result<(), PipelineError> {
        match self.refresher.refresh(identity).await {
            Ok(Some(count)) => {
                debug!("Loaded {} notifications for {}", count, identity);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                warn!("Fetching notifications for {} failed: {}", identity, e);
                Err(e.into())
            }
        }
    }

    /// Re-fetch the authoritative list; on failure the store is left as it was
    pub async fn refresh(&self) -> Result<(), PipelineError> {
        let identity = self.require_identity()?;
        self.fetch_into_store(&identity).await
    }

    pub async fn mark_read(&self, id: &NotificationId) -> Result<MarkReadOutcome, PipelineError> {
        self.require_identity()?;
        Ok(self.coordinator.mark_read(id).await?)
    }

    pub async fn mark_all_read(&self) -> Result<MarkAllReadSummary, PipelineError> {
        self.require_identity()?;
        Ok(self.coordinator.mark_all_read().await)
    }

    /// Admin-only announcement to every identity
    pub async fn send_broadcast(&self, title: &str, message: &str) -> Result<(), PipelineError> {
        let identity = self.require_identity()?;
        if !identity.is_admin() {
            return Err(NotificationPortError::Forbidden(format!("{} cannot send broadcasts", identity.role)).into());
        }

        let request = BroadcastRequest::announcement(title, message);
        request.validate()?;
        self.api.send_broadcast(&request).await?;
        info!("Broadcast '{}' sent by {}", title, identity);
        Ok(())
    }

    /// Render model for the current records, newest first
    pub fn cards(&self, now: DateTime<Utc>) -> Vec<NotificationCard> {
        let resolver = match self.identity() {
            Some(identity) => CategoryResolver::for_role(identity.role),
            None => CategoryResolver::general(),
        };

        self.store
            .snapshot()
            .into_iter()
            .map(|record| NotificationCard {
                presentation: resolver.resolve_record(&record),
                relative_time: format_relative_time(record.created_at, now),
                record,
            })
            .collect()
    }

    pub fn unread_count(&self) -> usize {
        self.store.unread_count()
    }

    /// Unread count as the backend sees it, for comparison with the derived count
    pub async fn server_unread_count(&self) -> Result<u64, PipelineError> {
        let identity = self.require_identity()?;
        Ok(self.api.unread_count(&identity).await?)
    }

    pub fn store(&self) -> Arc<NotificationStore> {
        self.store.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connections.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connections.watch_state()
    }
}
