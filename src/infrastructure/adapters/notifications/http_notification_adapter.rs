/*
HTTP Notification Adapter

Implements the notification API port against the notification backend's REST API:

- GET   {base}/api/v1/notifications/user/{userId}
- PATCH {base}/api/v1/notifications/{id}/read
- GET   {base}/api/v1/notifications/unread-count?userId=
- POST  {base}/api/v1/notifications/broadcast

Every response is wrapped in the `{success, message, data, timestamp}` envelope.
A bearer token, when configured, is sent on every request.
*/

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::application::ports::output::notification_port::{
    ApiResponse, BroadcastRequest, NotificationApiPort, NotificationPortError, NotificationPortResult,
};
use crate::config::ApiSettings;
use crate::core::platform::container::identity::Identity;
use crate::core::platform::container::notification::{NotificationId, NotificationPayload};

const API_PREFIX: &str = "/api/v1/notifications";

pub struct HttpNotificationAdapter {
    base_url: String,
    client: Client,
}

impl HttpNotificationAdapter {
    pub fn new(settings: &ApiSettings) -> NotificationPortResult<Self> {
        if !settings.base_url.starts_with("http") {
            return Err(NotificationPortError::ValidationError(
                "Base URL must start with http or https".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &settings.auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| NotificationPortError::ValidationError("Invalid auth token format".to_string()))?,
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| NotificationPortError::ConnectionError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> NotificationPortResult<Option<T>> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NotificationPortError::Timeout
            } else {
                NotificationPortError::ConnectionError(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotificationPortError::InvalidResponse(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(map_status(status, envelope_message(&body)));
        }

        serde_json::from_str::<ApiResponse<T>>(&body)
            .map_err(|e| NotificationPortError::InvalidResponse(format!("Failed to parse response: {}", e)))?
            .into_result()
    }
}

/// The backend puts a human readable reason in the envelope, even on errors
fn envelope_message(body: &str) -> String {
    serde_json::from_str::<ApiResponse<Value>>(body)
        .ok()
        .and_then(|envelope| envelope.message)
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn map_status(status: StatusCode, message: String) -> NotificationPortError {
    match status {
        StatusCode::NOT_FOUND => NotificationPortError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => NotificationPortError::Forbidden(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => NotificationPortError::ValidationError(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => NotificationPortError::Timeout,
        _ => NotificationPortError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl NotificationApiPort for HttpNotificationAdapter {
    async fn fetch_notifications(&self, identity: &Identity) -> NotificationPortResult<Vec<NotificationPayload>> {
        let url = self.url(&format!("/user/{}", identity.user_id));
        debug!("Fetching notifications for {}", identity);
        let data: Option<Vec<NotificationPayload>> = self.send(self.client.get(&url)).await?;
        Ok(data.unwrap_or_default())
    }

    async fn mark_read(&self, id: &NotificationId) -> NotificationPortResult<()> {
        let url = self.url(&format!("/{}/read", id));
        let _: Option<Value> = self.send(self.client.patch(&url)).await?;
        Ok(())
    }

    async fn unread_count(&self, identity: &Identity) -> NotificationPortResult<u64> {
        let url = self.url("/unread-count");
        let request = self.client.get(&url).query(&[("userId", identity.user_id.as_str())]);
        let count: Option<u64> = self.send(request).await?;
        count.ok_or_else(|| NotificationPortError::InvalidResponse("Unread count missing from response".to_string()))
    }

    async fn send_broadcast(&self, request: &BroadcastRequest) -> NotificationPortResult<()> {
        request.validate()?;
        let url = self.url("/broadcast");
        let _: Option<Value> = self.send(self.client.post(&url).json(request)).await?;
        Ok(())
    }
}
