use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheStore, FileCache, MemoryCache};
use crate::client::ClientOptions;
use crate::reconnect::ReconnectPolicy;

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Overrides `endpoints.ws_url`.
pub const ENV_WS_URL: &str = "BITREDICT_WS_URL";
/// Overrides `endpoints.api_base`.
pub const ENV_API_BASE: &str = "BITREDICT_API_BASE";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub community: CommunityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_ws_url() -> String {
    crate::DEFAULT_WS_URL.to_string()
}

fn default_api_base() -> String {
    crate::DEFAULT_API_BASE.to_string()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            api_base: default_api_base(),
        }
    }
}

/// Reconnect and keepalive settings for the realtime client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub backoff_multiplier: f64,
    pub max_reconnect_delay_ms: u64,
    pub jitter: bool,
    /// 0 disables pings.
    pub ping_interval_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 3000,
            max_reconnect_attempts: 5,
            backoff_multiplier: 1.0,
            max_reconnect_delay_ms: 30_000,
            jitter: false,
            ping_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub cap: usize,
    pub history_limit: u32,
    /// Directory for the durable cache. Empty keeps the cache in memory.
    pub cache_dir: Option<PathBuf>,
    pub system_alerts: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            cap: crate::state::DEFAULT_CAP,
            history_limit: crate::center::DEFAULT_HISTORY_LIMIT,
            cache_dir: Some(PathBuf::from(".bitredict/cache")),
            system_alerts: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    pub store_path: PathBuf,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("data/community.json"),
        }
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let config = Self::load(path)?;
            info!(path = %path.display(), "Loaded config");
            Ok(config)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply `BITREDICT_*` endpoint overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_WS_URL).filter(|v| !v.trim().is_empty()) {
            self.endpoints.ws_url = url;
        }
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            self.endpoints.api_base = base;
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let r = &self.realtime;
        ReconnectPolicy {
            delay: Duration::from_millis(r.reconnect_delay_ms),
            max_attempts: r.max_reconnect_attempts,
            backoff_multiplier: r.backoff_multiplier.max(1.0),
            max_delay: Duration::from_millis(r.max_reconnect_delay_ms.max(r.reconnect_delay_ms)),
            jitter: r.jitter,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            url: self.endpoints.ws_url.clone(),
            policy: self.reconnect_policy(),
            ping_interval: (self.realtime.ping_interval_secs > 0)
                .then(|| Duration::from_secs(self.realtime.ping_interval_secs)),
            enabled: true,
        }
    }

    pub fn cache_store(&self) -> Box<dyn CacheStore> {
        match &self.notifications.cache_dir {
            Some(dir) if !dir.as_os_str().is_empty() => Box::new(FileCache::new(dir.clone())),
            _ => Box::new(MemoryCache::default()),
        }
    }
}
