// src/lib.rs
pub mod application;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infrastructure;

pub use crate::application::service::{NotificationCard, NotificationCenter};
pub use crate::config::Settings;
pub use crate::core::platform::container::identity::{Identity, Role};
pub use crate::core::platform::container::notification::{NotificationChannel, NotificationId, NotificationRecord};
pub use crate::core::platform::manager::connection_manager::{ConnectionState, ReconnectPolicy};
pub use crate::core::platform::manager::read_state_coordinator::MarkReadOutcome;
pub use crate::error::PipelineError;
