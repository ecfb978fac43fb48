/*
In-Memory Broker Adapter

A process-local publish/subscribe broker implementing the broker ports. Useful for
tests and local demos where no STOMP broker is running:

- publish to a destination and every subscription on it receives the message
- drop every open connection to simulate a transport loss
- make the next N connection attempts fail
- inspect open sessions and subscriptions

Delivery is per subscription, exactly like a real broker: a session subscribed
twice to the same destination receives every message twice.
*/

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::application::ports::output::broker_port::{
    BrokerError, BrokerMessage, BrokerResult, BrokerSession, BrokerTransport,
};

enum SessionEvent {
    Deliver(BrokerMessage),
    Drop,
}

struct SessionEntry {
    tx: mpsc::UnboundedSender<SessionEvent>,
    /// subscription id -> destination
    subscriptions: HashMap<String, String>,
}

#[derive(Default)]
struct BrokerState {
    next_session: u64,
    sessions: HashMap<u64, SessionEntry>,
    failing_connects: u32,
    opened: u64,
}

/// In-process broker; clones share the same state
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `body` to every subscription on `destination`; returns the delivery count
    pub fn publish(&self, destination: &str, body: impl Into<String>) -> usize {
        let body = body.into();
        let state = self.lock();
        let mut delivered = 0;

        for entry in state.sessions.values() {
            for (subscription_id, subscribed) in &entry.subscriptions {
                if subscribed != destination {
                    continue;
                }
                let message = BrokerMessage::new(destination, body.clone()).with_subscription(subscription_id.clone());
                if entry.tx.send(SessionEvent::Deliver(message)).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub fn publish_json<T: Serialize>(&self, destination: &str, payload: &T) -> serde_json::Result<usize> {
        let body = serde_json::to_string(payload)?;
        Ok(self.publish(destination, body))
    }

    /// Sever every open session as if the network went away
    pub fn drop_connections(&self) -> usize {
        let mut state = self.lock();
        let sessions: Vec<SessionEntry> = state.sessions.drain().map(|(_, entry)| entry).collect();
        for entry in &sessions {
            let _ = entry.tx.send(SessionEvent::Drop);
        }
        sessions.len()
    }

    /// Make the next `count` connection attempts fail
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().failing_connects = count;
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Successful connection attempts since creation
    pub fn total_opened(&self) -> u64 {
        self.lock().opened
    }

    /// Number of live subscriptions on a destination across all sessions
    pub fn subscription_count(&self, destination: &str) -> usize {
        self.lock()
            .sessions
            .values()
            .flat_map(|entry| entry.subscriptions.values())
            .filter(|subscribed| subscribed.as_str() == destination)
            .count()
    }

    pub fn subscribed_destinations(&self) -> Vec<String> {
        let mut destinations: Vec<String> = self
            .lock()
            .sessions
            .values()
            .flat_map(|entry| entry.subscriptions.values().cloned())
            .collect();
        destinations.sort();
        destinations
    }
}

#[async_trait]
impl BrokerTransport for InMemoryBroker {
    async fn open(&self) -> BrokerResult<Box<dyn BrokerSession>> {
        let mut state = self.lock();
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(BrokerError::ConnectionError("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.next_session;
        state.next_session += 1;
        state.opened += 1;
        state.sessions.insert(
            id,
            SessionEntry {
                tx,
                subscriptions: HashMap::new(),
            },
        );

        Ok(Box::new(InMemorySession {
            id,
            rx,
            broker: self.clone(),
        }))
    }
}

struct InMemorySession {
    id: u64,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    broker: InMemoryBroker,
}

#[async_trait]
impl BrokerSession for InMemorySession {
    async fn subscribe(&mut self, subscription_id: &str, destination: &str) -> BrokerResult<()> {
        let mut state = self.broker.lock();
        let entry = state.sessions.get_mut(&self.id).ok_or(BrokerError::Closed)?;
        entry
            .subscriptions
            .insert(subscription_id.to_string(), destination.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, subscription_id: &str) -> BrokerResult<()> {
        let mut state = self.broker.lock();
        let entry = state.sessions.get_mut(&self.id).ok_or(BrokerError::Closed)?;
        entry.subscriptions.remove(subscription_id);
        Ok(())
    }

    async fn next_message(&mut self) -> BrokerResult<Option<BrokerMessage>> {
        match self.rx.recv().await {
            Some(SessionEvent::Deliver(message)) => Ok(Some(message)),
            Some(SessionEvent::Drop) => Err(BrokerError::ConnectionError("connection dropped".to_string())),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> BrokerResult<()> {
        self.broker.lock().sessions.remove(&self.id);
        Ok(())
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        self.broker.lock().sessions.remove(&self.id);
    }
}
