//! Typed views over non-notification channels.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{trace, warn};

use crate::channel::Channel;
use crate::client::RealtimeClient;
use crate::envelope::{ChannelEvent, EventPayload};
use crate::subscription::Subscription;
use crate::types::string_or_number;

/// `pool:<id>` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolUpdate {
    #[serde(deserialize_with = "string_or_number")]
    pub pool_id: String,
    #[serde(default)]
    pub total_creator_side_stake: Option<Decimal>,
    #[serde(default)]
    pub total_bettor_stake: Option<Decimal>,
    #[serde(default)]
    pub odds: Option<Decimal>,
    #[serde(default)]
    pub settled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `bets:<poolId>` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetUpdate {
    #[serde(deserialize_with = "string_or_number")]
    pub pool_id: String,
    #[serde(default)]
    pub bettor: String,
    pub amount: Decimal,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `liquidity:added` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityUpdate {
    #[serde(deserialize_with = "string_or_number")]
    pub pool_id: String,
    #[serde(default)]
    pub provider: String,
    pub amount: Decimal,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `reputation:<addr>` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationUpdate {
    pub address: String,
    pub reputation: Decimal,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Latest decoded `update` payload of one channel.
pub struct LiveFeed<T> {
    channel: Channel,
    latest: watch::Receiver<Option<T>>,
    _subscription: Subscription,
}

impl<T> LiveFeed<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn attach(client: &RealtimeClient, channel: Channel) -> Self {
        let (tx, latest) = watch::channel(None);
        let label = channel.clone();
        let subscription = client.subscribe(channel.clone(), move |event: &ChannelEvent| {
            if let Some(value) = decode_update::<T>(&label, event) {
                tx.send_replace(Some(value));
            }
        });
        Self {
            channel,
            latest,
            _subscription: subscription,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn latest(&self) -> Option<T> {
        self.latest.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<T>> {
        self.latest.clone()
    }

    /// Wait for the next decoded update. `None` once the client is gone.
    pub async fn next(&mut self) -> Option<T> {
        self.latest.changed().await.ok()?;
        self.latest.borrow_and_update().clone()
    }
}

fn decode_update<T: DeserializeOwned>(channel: &Channel, event: &ChannelEvent) -> Option<T> {
    let EventPayload::Update(data) = &event.payload else {
        trace!(channel = %channel, "Non-update payload on feed channel");
        return None;
    };
    match T::deserialize(data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(channel = %channel, error = %e, "Skipping undecodable feed update");
            None
        }
    }
}
