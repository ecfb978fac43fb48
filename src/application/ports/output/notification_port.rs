/*
Notification Ports

Output port for the REST collaborators of the notification pipeline. The pipeline
only needs four plain request/response operations from the backend: list the
notifications of an identity, confirm that one notification was read, ask for the
server-side unread count, and (admins only) post a broadcast announcement. The
broadcast itself reaches clients through the broker, never through this port.

Adapters live in the Infrastructure Layer: the HTTP adapter talks to the real
backend and the in-memory adapter backs tests and local demos.
*/

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::platform::container::identity::Identity;
use crate::core::platform::container::notification::{NotificationId, NotificationPayload};

/// Result type for notification port operations
pub type NotificationPortResult<T> = Result<T, NotificationPortError>;

/// Errors that can occur in notification port operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotificationPortError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request rejected by backend: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Notification not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Timeout error")]
    Timeout,
}

/// Envelope every backend response is wrapped in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl<T> ApiResponse<T> {
    /// `success: false` is a failure even when the HTTP status was 2xx
    pub fn into_result(self) -> NotificationPortResult<Option<T>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(NotificationPortError::Rejected(
                self.message.unwrap_or_else(|| "no message".to_string()),
            ))
        }
    }
}

/// Admin announcement sent to every identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub channel: String,
    pub reference_type: String,
    pub reference_id: i64,
}

impl BroadcastRequest {
    pub fn announcement(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            kind: "ANNOUNCEMENT".to_string(),
            channel: "IN_APP".to_string(),
            reference_type: "SYSTEM".to_string(),
            reference_id: 0,
        }
    }

    pub fn validate(&self) -> NotificationPortResult<()> {
        if self.title.trim().is_empty() {
            return Err(NotificationPortError::ValidationError("title is required".to_string()));
        }
        if self.message.trim().is_empty() {
            return Err(NotificationPortError::ValidationError("message is required".to_string()));
        }
        if self.title.chars().count() > 200 {
            return Err(NotificationPortError::ValidationError(
                "title must be at most 200 characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// REST operations the notification pipeline depends on
#[async_trait]
pub trait NotificationApiPort: Send + Sync {
    /// Authoritative list of notifications addressed to `identity`
    async fn fetch_notifications(&self, identity: &Identity) -> NotificationPortResult<Vec<NotificationPayload>>;

    /// Confirm that a notification was read
    async fn mark_read(&self, id: &NotificationId) -> NotificationPortResult<()>;

    /// Server-side unread count, for diagnostics only
    async fn unread_count(&self, identity: &Identity) -> NotificationPortResult<u64>;

    /// Post an announcement to every identity
    async fn send_broadcast(&self, request: &BroadcastRequest) -> NotificationPortResult<()>;
}
