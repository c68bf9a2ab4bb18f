use std::fmt;

use serde::{Deserialize, Serialize};

const USER_PREFIX: &str = "user:";

/// Logical topic a push event is addressed to, e.g. `user:0xabc` or `pool:42`.
///
/// Opaque to the transport; two channels are equal when their strings are.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Per-user channel. Addresses are lowercased so checksummed and plain
    /// forms land on the same channel.
    pub fn user(address: &str) -> Self {
        Self(format!("{USER_PREFIX}{}", address.to_lowercase()))
    }

    pub fn pool(pool_id: impl fmt::Display) -> Self {
        Self(format!("pool:{pool_id}"))
    }

    pub fn pool_bets(pool_id: impl fmt::Display) -> Self {
        Self(format!("bets:{pool_id}"))
    }

    pub fn liquidity_added() -> Self {
        Self("liquidity:added".to_string())
    }

    pub fn reputation(address: &str) -> Self {
        Self(format!("reputation:{}", address.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_user(&self) -> bool {
        self.0.starts_with(USER_PREFIX)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Channel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Channel {
    fn from(name: String) -> Self {
        Self(name)
    }
}
