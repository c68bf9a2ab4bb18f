//! Wire frames for the push-update endpoint.
//!
//! The server speaks two dialects: the wrapped `update` envelope and the older
//! direct notification frames. [`decode`] normalizes both into a single
//! [`ChannelEvent`] so nothing past this module needs to know which one arrived.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::channel::Channel;
use crate::types::{NotificationRecord, parse_timestamp};

/// Frames the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    Subscribe { channel: Channel },
    Unsubscribe { channel: Channel },
}

impl OutboundFrame {
    pub fn to_text(&self) -> String {
        // Both variants are plain string maps; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Every inbound shape the server is known to send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum InboundFrame {
    #[serde(rename = "update")]
    Update {
        channel: Channel,
        #[serde(default)]
        data: Value,
        #[serde(default)]
        timestamp: Option<Value>,
    },
    #[serde(rename = "notification")]
    Notification { notification: NotificationRecord },
    #[serde(rename = "notification:unread_count")]
    UnreadCount {
        #[serde(rename = "unreadCount")]
        unread_count: u64,
    },
    #[serde(rename = "subscribed")]
    Subscribed { channel: Channel },
    #[serde(rename = "unsubscribed")]
    Unsubscribed { channel: Channel },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: String,
    },
}

/// Where a decoded event should be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Channel(Channel),
    /// Legacy frames that name no user go to every `user:*` subscription.
    AllUsers,
}

impl Route {
    pub fn matches(&self, channel: &Channel) -> bool {
        match self {
            Route::Channel(target) => target == channel,
            Route::AllUsers => channel.is_user(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Notification(NotificationRecord),
    UnreadCount(u64),
    /// Domain payload of a non-notification channel (pool, bets, liquidity, ...).
    Update(Value),
}

/// Canonical inbound event handed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub route: Route,
    pub payload: EventPayload,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Result of decoding one text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(ChannelEvent),
    Subscribed(Channel),
    Unsubscribed(Channel),
    ServerError(String),
}

pub fn decode(text: &str) -> serde_json::Result<Inbound> {
    let frame: InboundFrame = serde_json::from_str(text)?;
    Ok(match frame {
        InboundFrame::Update {
            channel,
            data,
            timestamp,
        } => {
            let payload = if channel.is_user() {
                user_payload(data)
            } else {
                EventPayload::Update(data)
            };
            Inbound::Event(ChannelEvent {
                route: Route::Channel(channel),
                payload,
                timestamp: timestamp.as_ref().and_then(parse_timestamp),
            })
        }
        InboundFrame::Notification { notification } => {
            let route = if notification.user_address.is_empty() {
                Route::AllUsers
            } else {
                Route::Channel(Channel::user(&notification.user_address))
            };
            Inbound::Event(ChannelEvent {
                route,
                timestamp: notification.created_at,
                payload: EventPayload::Notification(notification),
            })
        }
        InboundFrame::UnreadCount { unread_count } => Inbound::Event(ChannelEvent {
            route: Route::AllUsers,
            payload: EventPayload::UnreadCount(unread_count),
            timestamp: None,
        }),
        InboundFrame::Subscribed { channel } => Inbound::Subscribed(channel),
        InboundFrame::Unsubscribed { channel } => Inbound::Unsubscribed(channel),
        InboundFrame::Error { message } => Inbound::ServerError(message),
    })
}

/// `update` frames on a user channel carry either a notification record
/// (bare or under `notification`) or an unread counter.
fn user_payload(data: Value) -> EventPayload {
    let candidate = match data.get("notification") {
        Some(inner) => inner.clone(),
        None => data.clone(),
    };
    if let Some(id) = candidate.get("id").cloned() {
        match serde_json::from_value::<NotificationRecord>(candidate) {
            Ok(record) => return EventPayload::Notification(record),
            Err(e) => warn!(id = %id, error = %e, "User-channel payload is not a notification record"),
        }
    }
    if let Some(count) = data.get("unreadCount").and_then(Value::as_u64) {
        return EventPayload::UnreadCount(count);
    }
    EventPayload::Update(data)
}
