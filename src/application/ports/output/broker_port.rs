/*
Broker Ports

Output port for the publish/subscribe broker that pushes live notifications.
A transport opens sessions; a session is one established duplex connection on
which topics can be subscribed and from which messages are read in arrival order.

The Connection Manager owns the only session and drives it; the Topic Router
decides what to subscribe. Adapters: STOMP over WebSocket for the real broker and
an in-process broker for tests and local demos.
*/

use async_trait::async_trait;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors raised by broker transports and sessions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrokerError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Broker reported error: {message}")]
    BrokerReported { message: String, details: String },

    #[error("Connection closed")]
    Closed,
}

/// One message delivered on a subscribed destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub destination: String,
    pub subscription: Option<String>,
    pub body: String,
}

impl BrokerMessage {
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            subscription: None,
            body: body.into(),
        }
    }

    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }
}

/// Opens broker sessions
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Establish a new session, including the protocol handshake
    async fn open(&self) -> BrokerResult<Box<dyn BrokerSession>>;
}

/// An established broker connection
#[async_trait]
pub trait BrokerSession: Send {
    async fn subscribe(&mut self, subscription_id: &str, destination: &str) -> BrokerResult<()>;

    async fn unsubscribe(&mut self, subscription_id: &str) -> BrokerResult<()>;

    /// Next message in arrival order.
    ///
    /// `Ok(None)` means the broker closed the session; any error means the
    /// transport was lost. Must be cancel safe.
    async fn next_message(&mut self) -> BrokerResult<Option<BrokerMessage>>;

    async fn close(&mut self) -> BrokerResult<()>;
}
