/*
Connection lifecycle tests

Sign-in, identity switch, transport loss and sign-out as seen from the broker side.
*/

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use civic_notify::application::ports::output::broker_port::{
    BrokerMessage, BrokerResult, BrokerSession, BrokerTransport,
};
use civic_notify::core::platform::manager::connection_manager::ConnectionManager;
use civic_notify::infrastructure::adapters::broker::InMemoryBroker;
use civic_notify::core::platform::manager::topic_router::TopicTemplates;
use civic_notify::{ConnectionState, Identity, NotificationCenter, ReconnectPolicy, Role};

use crate::support::{citizen, eventually, fast_settings, settle, Fixture};

fn payload(id: i64) -> serde_json::Value {
    json!({"id": id, "title": "t", "message": "m", "createdAt": "2025-03-01T10:00:00"})
}

#[tokio::test]
async fn test_identity_switch_replaces_subscriptions() {
    let fixture = Fixture::new();
    fixture.api.seed("42", "for 42", "private");
    fixture.api.seed("7", "for 7", "private");
    let center = fixture.center();

    center.sign_in(citizen()).await.unwrap();
    eventually("first connection", || center.connection_state() == ConnectionState::Connected).await;

    center.sign_in(Identity::new("7", Role::Volunteer)).await.unwrap();
    eventually("second connection", || center.connection_state() == ConnectionState::Connected).await;

    assert_eq!(fixture.broker.open_sessions(), 1);
    assert_eq!(
        fixture.broker.subscribed_destinations(),
        vec!["/topic/announcements".to_string(), "/topic/notifications/7".to_string()]
    );
    let titles: Vec<String> = center.store().snapshot().into_iter().map(|r| r.title).collect();
    assert_eq!(titles, vec!["for 7".to_string()]);

    center.sign_out().await;
}

#[tokio::test]
async fn test_signing_in_again_keeps_one_connection() {
    let fixture = Fixture::new();
    let center = fixture.center();

    center.sign_in(citizen()).await.unwrap();
    eventually("connection", || center.connection_state() == ConnectionState::Connected).await;
    center.sign_in(citizen()).await.unwrap();
    settle().await;

    assert_eq!(fixture.broker.total_opened(), 1);
    assert_eq!(fixture.broker.subscription_count("/topic/notifications/42"), 1);
    assert_eq!(fixture.broker.subscription_count("/topic/announcements"), 1);

    center.sign_out().await;
}

#[tokio::test]
async fn test_reconnects_and_resubscribes_after_loss() {
    let fixture = Fixture::new();
    let center = fixture.center();
    center.sign_in(citizen()).await.unwrap();
    eventually("connection", || center.connection_state() == ConnectionState::Connected).await;

    fixture.broker.fail_next_connects(2);
    assert_eq!(fixture.broker.drop_connections(), 1);

    eventually("reconnect", || {
        fixture.broker.total_opened() == 2 && center.connection_state() == ConnectionState::Connected
    })
    .await;
    assert_eq!(fixture.broker.subscription_count("/topic/notifications/42"), 1);

    fixture.api.notify("42", "After reconnect", "still here");
    eventually("push after reconnect", || center.unread_count() == 1).await;

    center.sign_out().await;
}

#[tokio::test]
async fn test_no_callback_after_disconnect() {
    let fixture = Fixture::new();
    let manager = ConnectionManager::new(
        Arc::new(fixture.broker.clone()),
        TopicTemplates::default(),
        ReconnectPolicy::Fixed { delay_ms: 20 },
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    manager
        .connect(
            citizen(),
            Arc::new(move |_record| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;
    let mut state = manager.watch_state();
    tokio::time::timeout(crate::support::WAIT_LIMIT, state.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();

    fixture.broker.publish_json("/topic/notifications/42", &payload(1)).unwrap();
    eventually("first callback", || calls.load(Ordering::SeqCst) == 1).await;

    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Idle);
    assert_eq!(fixture.broker.open_sessions(), 0);

    assert_eq!(fixture.broker.publish_json("/topic/notifications/42", &payload(2)).unwrap(), 0);
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Broker whose first session panics on the first message it reads
struct PanicOnFirstMessage {
    broker: InMemoryBroker,
    armed: AtomicBool,
}

struct PanickingSession(Box<dyn BrokerSession>);

#[async_trait]
impl BrokerTransport for PanicOnFirstMessage {
    async fn open(&self) -> BrokerResult<Box<dyn BrokerSession>> {
        let session = self.broker.open().await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            Ok(Box::new(PanickingSession(session)))
        } else {
            Ok(session)
        }
    }
}

#[async_trait]
impl BrokerSession for PanickingSession {
    async fn subscribe(&mut self, subscription_id: &str, destination: &str) -> BrokerResult<()> {
        self.0.subscribe(subscription_id, destination).await
    }

    async fn unsubscribe(&mut self, subscription_id: &str) -> BrokerResult<()> {
        self.0.unsubscribe(subscription_id).await
    }

    async fn next_message(&mut self) -> BrokerResult<Option<BrokerMessage>> {
        let message = self.0.next_message().await?;
        panic!("cannot handle {:?}", message.map(|m| m.destination));
    }

    async fn close(&mut self) -> BrokerResult<()> {
        self.0.close().await
    }
}

#[tokio::test]
async fn test_panicking_session_reconnects() {
    let fixture = Fixture::new();
    let transport = PanicOnFirstMessage {
        broker: fixture.broker.clone(),
        armed: AtomicBool::new(true),
    };
    let manager = ConnectionManager::new(
        Arc::new(transport),
        TopicTemplates::default(),
        ReconnectPolicy::Fixed { delay_ms: 20 },
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    manager
        .connect(
            citizen(),
            Arc::new(move |record| {
                sink.lock().unwrap().push(record.id.to_string());
            }),
        )
        .await;
    eventually("first connection", || manager.state() == ConnectionState::Connected).await;

    fixture.broker.publish_json("/topic/notifications/42", &payload(1)).unwrap();
    eventually("reconnect after panic", || {
        fixture.broker.total_opened() == 2 && manager.state() == ConnectionState::Connected
    })
    .await;
    assert_eq!(fixture.broker.subscription_count("/topic/notifications/42"), 1);

    fixture.broker.publish_json("/topic/notifications/42", &payload(2)).unwrap();
    eventually("delivery after panic", || seen.lock().unwrap().len() == 1).await;
    assert_eq!(*seen.lock().unwrap(), vec!["2".to_string()]);

    manager.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_while_reconnecting_stops_retries() {
    let fixture = Fixture::new();
    fixture.broker.fail_next_connects(u32::MAX);
    let center = fixture.center();

    center.sign_in(citizen()).await.unwrap();
    eventually("retrying", || {
        matches!(center.connection_state(), ConnectionState::Reconnecting { attempt } if attempt >= 2)
    })
    .await;

    center.sign_out().await;
    assert_eq!(center.connection_state(), ConnectionState::Idle);
    fixture.broker.fail_next_connects(0);
    settle().await;
    assert_eq!(fixture.broker.total_opened(), 0);
}

#[tokio::test]
async fn test_malformed_frame_does_not_break_connection() {
    let fixture = Fixture::new();
    let center = fixture.center();
    center.sign_in(citizen()).await.unwrap();
    eventually("connection", || center.connection_state() == ConnectionState::Connected).await;

    fixture.broker.publish("/topic/notifications/42", "{not json");
    fixture.broker.publish("/topic/notifications/42", r#"{"id": 3, "title": "no timestamp"}"#);
    fixture.broker.publish_json("/topic/notifications/42", &payload(4)).unwrap();

    eventually("valid frame after garbage", || center.unread_count() == 1).await;
    assert_eq!(center.connection_state(), ConnectionState::Connected);
    assert_eq!(fixture.broker.total_opened(), 1);

    center.sign_out().await;
}

#[tokio::test]
async fn test_sign_out_clears_everything() {
    let fixture = Fixture::new();
    fixture.api.seed("42", "a", "one");
    let center = fixture.center();
    center.sign_in(citizen()).await.unwrap();
    eventually("connection", || center.connection_state() == ConnectionState::Connected).await;

    center.sign_out().await;

    assert!(center.store().is_empty());
    assert_eq!(center.identity(), None);
    assert_eq!(fixture.broker.open_sessions(), 0);

    fixture.api.notify("42", "late", "nobody listens");
    settle().await;
    assert!(center.store().is_empty());
}

#[tokio::test]
async fn test_sign_out_interrupts_refresh_in_flight() {
    let fixture = Fixture::new();
    let mut settings = fast_settings();
    settings.refresh.interval_secs = 1;
    let center = NotificationCenter::new(&settings, Arc::new(fixture.api.clone()), Arc::new(fixture.broker.clone()));

    center.sign_in(citizen()).await.unwrap();
    fixture.api.pause_fetch();
    eventually("periodic refresh in flight", || fixture.api.fetch_calls() == 2).await;

    tokio::time::timeout(std::time::Duration::from_millis(500), center.sign_out())
        .await
        .expect("sign_out waited on the stalled refresh");
    assert_eq!(center.identity(), None);

    fixture.api.resume_fetch();
}
