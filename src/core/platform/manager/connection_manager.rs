/*
Connection Manager

Owns the single live connection to the notification broker for the signed-in
identity. Within the Hexagonal Architecture it sits at the Platform Layer: it drives
a BrokerTransport port and hands decoded records to a callback, nothing more.

Lifecycle:

    Idle -> Connecting -> Connected -> Disconnecting -> Idle
                              |
                              v
                   Reconnecting { attempt } -> Connected

- connect for the identity already connected only re-asserts its subscriptions
- connect for a different identity tears the old connection down first
- an unexpected loss is retried forever, spaced by the ReconnectPolicy, until
  disconnect; a panic inside a session counts as a loss
- disconnect closes the callback gate before stopping the connection task, so no
  callback fires once it returns

Each connection runs as one spawned task that owns the broker session and the
Topic Router for it. The task stops on a broadcast shutdown signal.
*/

use futures::FutureExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::application::ports::output::broker_port::{BrokerError, BrokerSession, BrokerTransport};
use crate::core::platform::container::identity::Identity;
use crate::core::platform::manager::topic_router::{CallbackGate, NotificationCallback, TopicRouter, TopicTemplates};

/// Upper bound for a graceful close before the task is aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Delay between reconnect attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    Fixed {
        delay_ms: u64,
    },
    Exponential {
        initial_ms: u64,
        max_ms: u64,
        multiplier: f64,
    },
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            ReconnectPolicy::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            ReconnectPolicy::Exponential {
                initial_ms,
                max_ms,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1).min(64) as i32;
                let millis = (*initial_ms as f64 * multiplier.max(1.0).powi(exponent)).min(*max_ms as f64);
                Duration::from_millis(millis as u64)
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed { delay_ms: 5000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Disconnecting,
}

enum Command {
    Resubscribe,
}

struct ConnectionHandle {
    identity: Identity,
    gate: CallbackGate,
    shutdown: broadcast::Sender<()>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// Why a connected session stopped pumping
enum SessionExit {
    Shutdown,
    Lost(BrokerError),
}

pub struct ConnectionManager {
    transport: Arc<dyn BrokerTransport>,
    templates: TopicTemplates,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    handle: Mutex<Option<ConnectionHandle>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn BrokerTransport>, templates: TopicTemplates, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            transport,
            templates,
            policy,
            state: Arc::new(state),
            handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Start listening for `identity`, delivering every decoded record to `callback`
    pub async fn connect(&self, identity: Identity, callback: NotificationCallback) {
        let mut slot = self.handle.lock().await;

        if let Some(handle) = slot.as_ref() {
            if handle.identity == identity && !handle.task.is_finished() {
                debug!("Already connected as {}, re-asserting subscriptions", identity);
                handle.gate.replace(callback);
                let _ = handle.commands.send(Command::Resubscribe);
                return;
            }
        }

        if let Some(stale) = slot.take() {
            info!("Switching broker connection from {} to {}", stale.identity, identity);
            self.teardown(stale).await;
        }

        let gate = CallbackGate::open(callback);
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_connection(
            self.transport.clone(),
            TopicRouter::new(self.templates.clone()),
            identity.clone(),
            gate.clone(),
            self.policy.clone(),
            self.state.clone(),
            shutdown_rx,
            commands_rx,
        ));

        *slot = Some(ConnectionHandle {
            identity,
            gate,
            shutdown,
            commands,
            task,
        });
    }

    /// Stop listening; no callback fires after this returns
    pub async fn disconnect(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            self.teardown(handle).await;
        }
    }

    async fn teardown(&self, handle: ConnectionHandle) {
        self.state.send_replace(ConnectionState::Disconnecting);
        handle.gate.close();
        let _ = handle.shutdown.send(());

        let mut task = handle.task;
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(Err(e)) if e.is_panic() => error!("Connection task for {} panicked", handle.identity),
            Ok(_) => {}
            Err(_) => {
                warn!("Connection task for {} did not stop in time, aborting", handle.identity);
                task.abort();
            }
        }

        self.state.send_replace(ConnectionState::Idle);
        info!("Disconnected {}", handle.identity);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_connection(
    transport: Arc<dyn BrokerTransport>,
    mut router: TopicRouter,
    identity: Identity,
    gate: CallbackGate,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    mut shutdown: broadcast::Receiver<()>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut attempt: u32 = 0;

    loop {
        state.send_replace(if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        });

        let session = run_session(
            transport.as_ref(),
            &mut router,
            &identity,
            &gate,
            &state,
            &mut attempt,
            &mut shutdown,
            &mut commands,
        );

        // A panic while decoding or delivering is a lost session, not a dead task
        match AssertUnwindSafe(session).catch_unwind().await {
            Ok(SessionExit::Shutdown) => break,
            Ok(SessionExit::Lost(e)) => warn!("Broker session for {} ended: {}", identity, e),
            Err(_) => error!("Broker session for {} panicked, reconnecting", identity),
        }

        attempt = attempt.saturating_add(1);
        let delay = policy.delay_for(attempt);
        state.send_replace(ConnectionState::Reconnecting { attempt });
        debug!("Reconnecting in {:?} (attempt {})", delay, attempt);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.recv() => break,
        }
    }

    debug!("Connection task for {} finished", identity);
}

/// One broker session: open, subscribe, then pump until shutdown or loss
#[allow(clippy::too_many_arguments)]
async fn run_session(
    transport: &dyn BrokerTransport,
    router: &mut TopicRouter,
    identity: &Identity,
    gate: &CallbackGate,
    state: &watch::Sender<ConnectionState>,
    attempt: &mut u32,
    shutdown: &mut broadcast::Receiver<()>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> SessionExit {
    let opened = tokio::select! {
        result = transport.open() => result,
        _ = shutdown.recv() => return SessionExit::Shutdown,
    };
    let mut session = match opened {
        Ok(session) => session,
        Err(e) => return SessionExit::Lost(e),
    };

    router.clear();
    if let Err(e) = router.subscribe(session.as_mut(), identity).await {
        return SessionExit::Lost(e);
    }

    *attempt = 0;
    state.send_replace(ConnectionState::Connected);
    info!("Connected to broker as {}", identity);

    let exit = pump(session.as_mut(), router, identity, gate, shutdown, commands).await;
    if let SessionExit::Shutdown = exit {
        close_session(session.as_mut(), router).await;
    }
    exit
}

async fn pump(
    session: &mut dyn BrokerSession,
    router: &mut TopicRouter,
    identity: &Identity,
    gate: &CallbackGate,
    shutdown: &mut broadcast::Receiver<()>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> SessionExit {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return SessionExit::Shutdown,
            Some(Command::Resubscribe) = commands.recv() => {
                if let Err(e) = router.subscribe(session, identity).await {
                    return SessionExit::Lost(e);
                }
            }
            message = session.next_message() => match message {
                Ok(Some(message)) => {
                    if let Some(record) = router.route(&message) {
                        gate.deliver(record);
                    }
                }
                Ok(None) => return SessionExit::Lost(BrokerError::Closed),
                Err(e) => return SessionExit::Lost(e),
            },
        }
    }
}

async fn close_session(session: &mut dyn BrokerSession, router: &mut TopicRouter) {
    if let Err(e) = router.unsubscribe_all(session).await {
        debug!("Unsubscribe on close failed: {}", e);
    }
    if let Err(e) = session.close().await {
        debug!("Closing broker session failed: {}", e);
    }
}
