pub mod alerts;
pub mod api;
pub mod cache;
pub mod center;
pub mod channel;
pub mod client;
pub mod community;
pub mod config;
pub mod envelope;
pub mod feeds;
pub mod mutation;
pub mod reconnect;
pub mod reporter;
pub mod state;
pub mod subscription;
pub mod transport;
pub mod types;

pub use channel::Channel;
pub use client::{ClientOptions, RealtimeClient};
pub use center::NotificationCenter;
pub use envelope::{ChannelEvent, EventPayload};
pub use subscription::{Subscription, SubscriptionStream};

/// Push-update WebSocket endpoint of a local backend.
pub const DEFAULT_WS_URL: &str = "ws://localhost:3001/ws";

/// REST base of a local backend (notification history and mutations).
pub const DEFAULT_API_BASE: &str = "http://localhost:3001";
