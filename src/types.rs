use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::channel::Channel;
use crate::mutation::Mutation;

/// A single user notification as served by the backend and pushed over the
/// realtime channel. `id` is the only deduplication key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(deserialize_with = "int_or_string")]
    pub id: i64,
    #[serde(default)]
    pub user_address: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub read: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// The `(notifications, unreadCount)` pair persisted to the durable cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSnapshot {
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: u64,
}

/// Transport state as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only snapshot of the realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Consecutive reconnect attempts since the last successful open.
    pub retry_count: u32,
    /// A reconnect timer is armed.
    pub reconnect_pending: bool,
    /// The attempt ceiling was hit; only a manual reconnect restarts the link.
    pub gave_up: bool,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry_count: 0,
            reconnect_pending: false,
            gave_up: false,
        }
    }
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Line-oriented event emitted by the CLI on stdout.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LiveEvent {
    Connection {
        timestamp: String,
        #[serde(flatten)]
        status: ConnectionStatus,
    },
    Snapshot {
        timestamp: String,
        address: String,
        #[serde(flatten)]
        snapshot: NotificationSnapshot,
    },
    Notification {
        timestamp: String,
        record: NotificationRecord,
        unread_count: u64,
    },
    DuplicateDropped {
        timestamp: String,
        id: i64,
    },
    UnreadCount {
        timestamp: String,
        unread_count: u64,
    },
    FeedUpdate {
        timestamp: String,
        channel: Channel,
        data: Value,
    },
    Mutation {
        timestamp: String,
        mutation: Mutation,
    },
}

/// Backend ids arrive as JSON numbers or as numeric strings (bigint columns).
pub(crate) fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// `createdAt` values the server sends in several shapes; anything
/// unrecognized becomes `None` rather than failing the whole record.
pub(crate) fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(parse_timestamp(&Value::deserialize(deserializer)?))
}

/// Epoch milliseconds, RFC 3339, or `YYYY-MM-DD HH:MM:SS[.f]` taken as UTC.
pub(crate) fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.and_utc())
            })
            .ok(),
        _ => None,
    }
}

/// Pool ids are strings on some channels and numbers on others.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
