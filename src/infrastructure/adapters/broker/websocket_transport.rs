/*
STOMP over WebSocket Transport

Broker transport for a STOMP 1.2 broker reachable through a plain WebSocket
endpoint (no SockJS negotiation). Opening a session connects the socket, sends
CONNECT and waits for CONNECTED within the configured handshake timeout.

An ERROR frame from the broker is logged with its message header and body and
ends the session, since brokers close the connection right after sending one.
Frames that fail to decode are dropped with a warning, along with whatever follows
them in the same WebSocket message; frames before them are still delivered.
*/

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::application::ports::output::broker_port::{
    BrokerError, BrokerMessage, BrokerResult, BrokerSession, BrokerTransport,
};
use crate::config::application_settings::BrokerSettings;
use crate::infrastructure::adapters::broker::stomp_frame::{decode_frames_partial, StompCommand, StompFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens STOMP sessions over WebSocket
#[derive(Debug, Clone)]
pub struct StompWebSocketTransport {
    settings: BrokerSettings,
}

impl StompWebSocketTransport {
    pub fn new(settings: BrokerSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BrokerTransport for StompWebSocketTransport {
    async fn open(&self) -> BrokerResult<Box<dyn BrokerSession>> {
        let url = Url::parse(&self.settings.url)
            .map_err(|e| BrokerError::ConnectionError(format!("Invalid broker URL {}: {}", self.settings.url, e)))?;
        let host = url.host_str().unwrap_or("localhost").to_string();

        debug!("Opening WebSocket to {}", url);
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| BrokerError::ConnectionError(format!("WebSocket connect failed: {}", e)))?;

        let mut session = StompWebSocketSession::new(stream);
        let timeout = Duration::from_secs(self.settings.connect_timeout_secs);
        let handshake = session.handshake(&host, self.settings.auth_token.as_deref());

        match tokio::time::timeout(timeout, handshake).await {
            Ok(result) => result?,
            Err(_) => return Err(BrokerError::HandshakeTimeout),
        }

        info!("STOMP session established with {}", url);
        Ok(Box::new(session))
    }
}

/// One STOMP session on an open WebSocket
pub struct StompWebSocketSession {
    stream: WsStream,
    pending: VecDeque<BrokerMessage>,
    pending_error: Option<BrokerError>,
    receipts: u64,
}

impl StompWebSocketSession {
    fn new(stream: WsStream) -> Self {
        Self {
            stream,
            pending: VecDeque::new(),
            pending_error: None,
            receipts: 0,
        }
    }

    async fn send_frame(&mut self, frame: StompFrame) -> BrokerResult<()> {
        self.stream
            .send(Message::Text(frame.encode()))
            .await
            .map_err(|e| BrokerError::ConnectionError(format!("Failed to send {}: {}", frame.command, e)))
    }

    /// Frames of the next WebSocket data message; `None` once the socket closed
    async fn read_frames(&mut self) -> BrokerResult<Option<Vec<StompFrame>>> {
        loop {
            let text = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Dropping non UTF-8 broker message: {}", e);
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(BrokerError::ConnectionError(format!("WebSocket error: {}", e))),
            };

            let (frames, err) = decode_frames_partial(&text);
            if let Some(e) = err {
                warn!("Dropping undecodable STOMP data after {} frame(s): {}", frames.len(), e);
            }
            if !frames.is_empty() {
                return Ok(Some(frames));
            }
        }
    }

    async fn handshake(&mut self, host: &str, auth_token: Option<&str>) -> BrokerResult<()> {
        self.send_frame(StompFrame::connect(host, auth_token)).await?;

        loop {
            let frames = self.read_frames().await?.ok_or(BrokerError::Closed)?;
            let mut frames = frames.into_iter();
            while let Some(frame) = frames.next() {
                match frame.command {
                    StompCommand::Connected => {
                        debug!("CONNECTED, version {}", frame.get_header("version").unwrap_or("1.0"));
                        self.absorb(frames.collect());
                        return Ok(());
                    }
                    StompCommand::Error => {
                        let message = frame.get_header("message").unwrap_or("unknown error").to_string();
                        error!("Broker rejected CONNECT: {} {}", message, frame.body);
                        return Err(BrokerError::HandshakeFailed(message));
                    }
                    other => debug!("Ignoring {} before CONNECTED", other),
                }
            }
        }
    }

    fn absorb(&mut self, frames: Vec<StompFrame>) {
        for frame in frames {
            match frame.command {
                StompCommand::Message => match frame.get_header("destination") {
                    Some(destination) => {
                        let mut message = BrokerMessage::new(destination, frame.body.clone());
                        message.subscription = frame.get_header("subscription").map(str::to_string);
                        self.pending.push_back(message);
                    }
                    None => warn!("Dropping MESSAGE frame without destination"),
                },
                StompCommand::Error => {
                    let message = frame.get_header("message").unwrap_or("unknown error").to_string();
                    error!("Broker reported error: {}", message);
                    error!("Additional details: {}", frame.body);
                    self.pending_error = Some(BrokerError::BrokerReported {
                        message,
                        details: frame.body,
                    });
                    return;
                }
                other => debug!("Ignoring {} frame", other),
            }
        }
    }
}

#[async_trait]
impl BrokerSession for StompWebSocketSession {
    async fn subscribe(&mut self, subscription_id: &str, destination: &str) -> BrokerResult<()> {
        self.send_frame(StompFrame::subscribe(subscription_id, destination)).await
    }

    async fn unsubscribe(&mut self, subscription_id: &str) -> BrokerResult<()> {
        self.send_frame(StompFrame::unsubscribe(subscription_id)).await
    }

    async fn next_message(&mut self) -> BrokerResult<Option<BrokerMessage>> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Ok(Some(message));
            }
            if let Some(err) = self.pending_error.take() {
                return Err(err);
            }
            match self.read_frames().await? {
                Some(frames) => self.absorb(frames),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> BrokerResult<()> {
        self.receipts += 1;
        let receipt = format!("disconnect-{}", self.receipts);
        if let Err(e) = self.send_frame(StompFrame::disconnect(&receipt)).await {
            debug!("DISCONNECT not sent: {}", e);
        }
        self.stream
            .close(None)
            .await
            .map_err(|e| BrokerError::ConnectionError(format!("WebSocket close failed: {}", e)))
    }
}
