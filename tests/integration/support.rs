/*
Shared fixtures for the integration tests: an in-memory broker and backend wired
into a NotificationCenter with fast reconnects and no periodic refresh.

Set TEST_LOG=1 to see the pipeline's log output.
*/

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use civic_notify::core::platform::manager::connection_manager::ReconnectPolicy;
use civic_notify::core::platform::manager::topic_router::TopicTemplates;
use civic_notify::infrastructure::adapters::broker::InMemoryBroker;
use civic_notify::infrastructure::adapters::notifications::InMemoryNotificationApi;
use civic_notify::{Identity, NotificationCenter, Role, Settings};

pub const WAIT_LIMIT: Duration = Duration::from_secs(3);

pub fn init_logging() {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = env_logger::builder().is_test(true).try_init();
    }
}

pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.reconnect = ReconnectPolicy::Fixed { delay_ms: 20 };
    settings.refresh.interval_secs = 0;
    settings
}

pub fn citizen() -> Identity {
    Identity::new("42", Role::Citizen)
}

pub fn admin() -> Identity {
    Identity::new("1", Role::Admin)
}

pub struct Fixture {
    pub broker: InMemoryBroker,
    pub api: InMemoryNotificationApi,
}

impl Fixture {
    pub fn new() -> Self {
        init_logging();
        let broker = InMemoryBroker::new();
        let api = InMemoryNotificationApi::new().with_broker(broker.clone(), TopicTemplates::default());
        Self { broker, api }
    }

    pub fn center(&self) -> NotificationCenter {
        NotificationCenter::new(&fast_settings(), Arc::new(self.api.clone()), Arc::new(self.broker.clone()))
    }
}

/// Poll `check` until it holds, failing the test after WAIT_LIMIT
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while !check() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        sleep(Duration::from_millis(5)).await;
    }
}

/// Give in-flight deliveries a moment to land before asserting that nothing happened
pub async fn settle() {
    sleep(Duration::from_millis(50)).await;
}
