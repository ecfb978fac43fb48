// src/error.rs
use thiserror::Error;

use crate::application::ports::output::broker_port::BrokerError;
use crate::application::ports::output::notification_port::NotificationPortError;
use crate::core::platform::container::identity::UnknownRole;

/// Top-level error for wiring, configuration and the command line
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Notification backend error: {0}")]
    Backend(#[from] NotificationPortError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Invalid identity: {0}")]
    Identity(#[from] UnknownRole),

    #[error("Not signed in")]
    NotSignedIn,
}
