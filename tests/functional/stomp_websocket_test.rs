/*
STOMP over WebSocket functional tests

Runs the WebSocket transport against a scripted broker on a local socket: CONNECT
handshake with bearer token, SUBSCRIBE, batched MESSAGE frames with heart-beats in
between, undecodable frames inside a batch, ERROR frames and a broker that never
answers.
*/

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use civic_notify::application::ports::output::broker_port::{BrokerError, BrokerTransport};
use civic_notify::config::BrokerSettings;
use civic_notify::infrastructure::adapters::broker::stomp_frame::{decode_frames, StompCommand, StompFrame};
use civic_notify::infrastructure::adapters::broker::StompWebSocketTransport;

type ServerSocket = WebSocketStream<TcpStream>;

async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (tcp, _) = listener.accept().await.unwrap();
    accept_async(tcp).await.unwrap()
}

/// Next non heart-beat frame sent by the client
async fn next_frame(socket: &mut ServerSocket) -> StompFrame {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Some(frame) = decode_frames(&text).unwrap().into_iter().next() {
                    return frame;
                }
            }
            Some(Ok(_)) => continue,
            other => panic!("client went away: {:?}", other),
        }
    }
}

async fn send(socket: &mut ServerSocket, data: String) {
    socket.send(Message::Text(data)).await.unwrap();
}

fn settings(addr: SocketAddr, connect_timeout_secs: u64) -> BrokerSettings {
    BrokerSettings {
        url: format!("ws://{}/ws/websocket", addr),
        connect_timeout_secs,
        auth_token: Some("secret".to_string()),
        ..BrokerSettings::default()
    }
}

#[tokio::test]
async fn test_session_handshake_subscribe_and_deliver() {
    let (listener, addr) = listen().await;

    let broker = tokio::spawn(async move {
        let mut socket = accept(&listener).await;

        let connect = next_frame(&mut socket).await;
        assert_eq!(connect.command, StompCommand::Connect);
        assert_eq!(connect.get_header("Authorization"), Some("Bearer secret"));
        assert_eq!(connect.get_header("host"), Some("127.0.0.1"));
        send(&mut socket, StompFrame::new(StompCommand::Connected).header("version", "1.2").encode()).await;

        let subscribe = next_frame(&mut socket).await;
        assert_eq!(subscribe.command, StompCommand::Subscribe);
        assert_eq!(subscribe.get_header("destination"), Some("/topic/announcements"));
        let id = subscribe.get_header("id").unwrap().to_string();

        let first = StompFrame::message("/topic/announcements", &id, "m-1", r#"{"title":"one"}"#);
        let second = StompFrame::message("/topic/announcements", &id, "m-2", r#"{"title":"two"}"#);
        send(&mut socket, format!("\n{}\n{}", first.encode(), second.encode())).await;

        let error = StompFrame::new(StompCommand::Error)
            .header("message", "session expired")
            .body("token no longer valid");
        send(&mut socket, error.encode()).await;
        socket
    });

    let transport = StompWebSocketTransport::new(settings(addr, 5));
    let mut session = transport.open().await.unwrap();
    session.subscribe("sub-0", "/topic/announcements").await.unwrap();

    let first = session.next_message().await.unwrap().unwrap();
    let second = session.next_message().await.unwrap().unwrap();
    assert_eq!(first.body, r#"{"title":"one"}"#);
    assert_eq!(first.subscription.as_deref(), Some("sub-0"));
    assert_eq!(second.body, r#"{"title":"two"}"#);

    match session.next_message().await {
        Err(BrokerError::BrokerReported { message, details }) => {
            assert_eq!(message, "session expired");
            assert_eq!(details, "token no longer valid");
        }
        other => panic!("expected broker error, got {:?}", other),
    }

    drop(broker.await.unwrap());
}

#[tokio::test]
async fn test_bad_frame_keeps_earlier_frames_of_the_batch() {
    let (listener, addr) = listen().await;

    let broker = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        next_frame(&mut socket).await;
        send(&mut socket, StompFrame::new(StompCommand::Connected).header("version", "1.2").encode()).await;

        let subscribe = next_frame(&mut socket).await;
        let id = subscribe.get_header("id").unwrap().to_string();

        let good = StompFrame::message("/topic/announcements", &id, "m-1", r#"{"title":"kept"}"#);
        let oversized = format!("MESSAGE\ndestination:/topic/announcements\ncontent-length:{}\n\n{{}}\0", usize::MAX);
        send(&mut socket, format!("{}{}", good.encode(), oversized)).await;

        let next = StompFrame::message("/topic/announcements", &id, "m-2", r#"{"title":"next"}"#);
        send(&mut socket, next.encode()).await;
        socket
    });

    let transport = StompWebSocketTransport::new(settings(addr, 5));
    let mut session = transport.open().await.unwrap();
    session.subscribe("sub-0", "/topic/announcements").await.unwrap();

    let first = session.next_message().await.unwrap().unwrap();
    let second = session.next_message().await.unwrap().unwrap();
    assert_eq!(first.body, r#"{"title":"kept"}"#);
    assert_eq!(second.body, r#"{"title":"next"}"#);

    drop(broker.await.unwrap());
}

#[tokio::test]
async fn test_rejected_connect_fails_handshake() {
    let (listener, addr) = listen().await;

    let broker = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        next_frame(&mut socket).await;
        let error = StompFrame::new(StompCommand::Error).header("message", "bad credentials");
        send(&mut socket, error.encode()).await;
        socket
    });

    let transport = StompWebSocketTransport::new(settings(addr, 5));
    match transport.open().await {
        Err(BrokerError::HandshakeFailed(message)) => assert_eq!(message, "bad credentials"),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("handshake should fail"),
    }

    drop(broker.await.unwrap());
}

#[tokio::test]
async fn test_silent_broker_times_out() {
    let (listener, addr) = listen().await;

    let broker = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        next_frame(&mut socket).await;
        // hold the socket open without answering
        let _ = socket.next().await;
    });

    let transport = StompWebSocketTransport::new(settings(addr, 1));
    assert!(matches!(transport.open().await, Err(BrokerError::HandshakeTimeout)));

    broker.abort();
}

#[tokio::test]
async fn test_unreachable_broker_is_a_connection_error() {
    let (listener, addr) = listen().await;
    drop(listener);

    let transport = StompWebSocketTransport::new(settings(addr, 1));
    assert!(matches!(transport.open().await, Err(BrokerError::ConnectionError(_))));
}
