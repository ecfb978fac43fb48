use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::core::platform::manager::connection_manager::ReconnectPolicy;
use crate::error::PipelineError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BrokerSettings {
    /// WebSocket endpoint of the STOMP broker
    pub url: String,
    /// Private topic template, `{id}` is replaced by the identity's user id
    pub private_topic: String,
    pub broadcast_topic: String,
    pub connect_timeout_secs: u64,
    pub auth_token: Option<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:9000/ws/websocket".to_string(),
            private_topic: "/topic/notifications/{id}".to_string(),
            broadcast_topic: "/topic/announcements".to_string(),
            connect_timeout_secs: 10,
            auth_token: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            auth_token: None,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RefreshSettings {
    /// Seconds between authoritative re-fetches; 0 disables periodic refresh
    pub interval_secs: u64,
}

impl RefreshSettings {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub api: ApiSettings,
    pub reconnect: ReconnectPolicy,
    pub refresh: RefreshSettings,
}

impl Settings {
    /// Layered settings: `config.*` in the working directory, then `config.<APP_ENV>.*`,
    /// then `APP__SECTION__KEY` environment variables.
    pub fn new() -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(File::with_name("config").required(false));

        if let Ok(env) = std::env::var("APP_ENV") {
            builder = builder.add_source(File::with_name(&format!("config.{}", env)).required(false));
        }

        builder
            .add_source(Environment::with_prefix("APP").prefix_separator("__").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn load_from_file(filename: &str) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(filename)
            .map_err(|e| PipelineError::Configuration(format!("Cannot read {}: {}", filename, e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, PipelineError> {
        serde_yaml::from_str(content).map_err(|e| PipelineError::Configuration(e.to_string()))
    }
}
