/*
Notification Container

A Notification Record is the client-side view of one notification addressed to the
signed-in identity, either through its private topic or through the shared
broadcast topic. Records arrive from two sources: the REST list endpoint (bulk
snapshot) and live frames pushed by the broker. Both carry the same JSON payload,
which is decoded here into `NotificationPayload` and then turned into a
`NotificationRecord` tagged with the channel it came from.

The record `id` is server-assigned and stable between fetch and push. Broadcast
frames are emitted by the backend before the per-user copies are persisted, so
they may carry no id at all; those get a deterministic synthetic id so that a
replayed broadcast still deduplicates.
*/

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

const SYNTHETIC_PREFIX: &str = "synthetic:";

/// Opaque notification identifier.
///
/// Accepted on the wire as a JSON number or string and always held as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Deterministic id for a payload that arrived without one
    pub fn synthetic(topic: &str, title: &str, message: &str, created_at: &DateTime<Utc>) -> Self {
        let seed = format!("{}\n{}\n{}\n{}", topic, title, message, created_at.to_rfc3339());
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes());
        Self(format!("{}{}", SYNTHETIC_PREFIX, uuid))
    }

    /// Synthetic ids are unknown to the backend and must never be sent to it
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(SYNTHETIC_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for NotificationId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Signed(i64),
            Unsigned(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Signed(n) => Ok(Self(n.to_string())),
            Raw::Unsigned(n) => Ok(Self(n.to_string())),
            Raw::Text(s) if s.trim().is_empty() => {
                Err(serde::de::Error::custom("notification id must not be empty"))
            }
            Raw::Text(s) => Ok(Self(s)),
        }
    }
}

/// Origin of a record: which subscription delivered it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    /// Addressed to the signed-in identity only
    Private,
    /// Shared announcement delivered to every identity
    Broadcast,
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::Private
    }
}

/// Extra fields the backend attaches to a notification; carried through untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Backend delivery channel label (e.g. "IN_APP"), unrelated to the origin tag
    #[serde(default, rename = "channel", skip_serializing_if = "Option::is_none")]
    pub delivery_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<i64>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub read_at: Option<DateTime<Utc>>,
}

/// Notification as it appears on the wire, in REST lists and broker frames alike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(default)]
    pub id: Option<NotificationId>,
    pub title: String,
    pub message: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(flatten)]
    pub details: NotificationDetails,
}

impl NotificationPayload {
    /// Turn a payload into a record, tagging it with the channel and topic it came from
    pub fn into_record(self, channel: NotificationChannel, topic: &str) -> NotificationRecord {
        let id = match self.id {
            Some(id) => id,
            None => NotificationId::synthetic(topic, &self.title, &self.message, &self.created_at),
        };

        NotificationRecord {
            id,
            title: self.title,
            message: self.message,
            created_at: self.created_at,
            is_read: self.is_read,
            channel,
            details: self.details,
        }
    }
}

/// Client-side notification record held by the store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    /// Serialized as `origin`; `channel` belongs to the backend delivery label
    #[serde(rename = "origin")]
    pub channel: NotificationChannel,
    #[serde(flatten)]
    pub details: NotificationDetails,
}

impl NotificationRecord {
    pub fn new(
        id: impl Into<NotificationId>,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message: message.into(),
            created_at,
            is_read: false,
            channel: NotificationChannel::Private,
            details: NotificationDetails::default(),
        }
    }

    pub fn read(mut self) -> Self {
        self.is_read = true;
        self
    }

    pub fn on_channel(mut self, channel: NotificationChannel) -> Self {
        self.channel = channel;
        self
    }
}

/// Human readable age of a notification relative to `now`
pub fn format_relative_time(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(created_at);

    if elapsed.num_seconds() < 60 {
        return "just now".to_string();
    }
    if elapsed.num_minutes() < 60 {
        return format!("{}m ago", elapsed.num_minutes());
    }
    if elapsed.num_hours() < 24 {
        return format!("{}h ago", elapsed.num_hours());
    }
    if elapsed.num_days() < 7 {
        return format!("{}d ago", elapsed.num_days());
    }

    created_at.format("%b %d, %Y").to_string()
}

/// Lenient timestamp decoding: RFC 3339, zone-less ISO local time (read as UTC),
/// or epoch seconds as a number.
pub(crate) mod timestamp {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Epoch(f64),
        Text(String),
    }

    pub fn parse(text: &str) -> Option<DateTime<Utc>> {
        let text = text.trim();
        DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| Utc.from_utc_datetime(&naive))
            })
    }

    fn from_epoch(seconds: f64) -> Option<DateTime<Utc>> {
        if !seconds.is_finite() {
            return None;
        }
        let whole = seconds.trunc() as i64;
        let nanos = ((seconds - seconds.trunc()) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
        Utc.timestamp_opt(whole, nanos).single()
    }

    fn convert<E: serde::de::Error>(raw: Raw) -> Result<DateTime<Utc>, E> {
        match raw {
            Raw::Text(text) => {
                parse(&text).ok_or_else(|| E::custom(format!("invalid timestamp: {}", text)))
            }
            Raw::Epoch(seconds) => {
                from_epoch(seconds).ok_or_else(|| E::custom(format!("invalid epoch timestamp: {}", seconds)))
            }
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        convert(Raw::deserialize(deserializer)?)
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            Some(raw) => convert(raw).map(Some),
            None => Ok(None),
        }
    }
}
