use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::types::NotificationRecord;

/// Maximum retry attempts for transient errors.
const MAX_RETRIES: u32 = 3;

/// Base backoff delay for retries (doubles each attempt).
const BASE_BACKOFF: Duration = Duration::from_millis(500);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {0}")]
    Status(StatusCode),
    #[error("server rejected request: {0}")]
    Rejected(String),
    #[error("invalid endpoint: {0}")]
    Url(#[from] url::ParseError),
}

/// Body of `GET /api/notifications`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationHistory {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub notifications: Vec<NotificationRecord>,
    #[serde(default)]
    pub unread_count: u64,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// The backend's notification endpoints.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn fetch_history(&self, address: &str, limit: u32) -> Result<NotificationHistory, ApiError>;
    async fn mark_read(&self, id: i64, address: &str) -> Result<(), ApiError>;
    async fn mark_all_read(&self, address: &str) -> Result<(), ApiError>;
    async fn delete(&self, id: i64, address: &str) -> Result<(), ApiError>;
    async fn delete_all(&self, address: &str) -> Result<(), ApiError>;
}

/// `reqwest` implementation against `<base>/api/notifications`.
#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    client: Client,
    base: Url,
    base_backoff: Duration,
}

impl HttpNotificationApi {
    pub fn new(base: &str) -> Result<Self, ApiError> {
        let mut base = Url::parse(base)?;
        // `join` replaces the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base,
            base_backoff: BASE_BACKOFF,
        })
    }

    /// First retry delay; later retries double it.
    pub fn with_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path)?)
    }

    /// Send with retries on transient failures (connect errors, timeouts,
    /// 429 and 5xx), doubling the backoff each time.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response, ApiError> {
        let mut attempt = 0;
        loop {
            let outcome = build().send().await;
            let transient = match &outcome {
                Ok(resp) => is_transient_status(resp.status()),
                Err(e) => e.is_connect() || e.is_timeout(),
            };
            if !transient || attempt >= MAX_RETRIES {
                let resp = outcome?;
                if !resp.status().is_success() {
                    return Err(ApiError::Status(resp.status()));
                }
                return Ok(resp);
            }
            attempt += 1;
            let backoff = self.base_backoff * 2u32.pow(attempt - 1);
            warn!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "Transient API failure, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Mutation endpoints answer `{ success, message? }`; an empty or
    /// non-JSON 2xx body counts as success.
    async fn expect_ack(resp: Response) -> Result<(), ApiError> {
        let body = resp.text().await?;
        match serde_json::from_str::<Ack>(&body) {
            Ok(ack) if !ack.success => Err(ApiError::Rejected(
                ack.message.unwrap_or_else(|| "unspecified".to_string()),
            )),
            _ => Ok(()),
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn fetch_history(&self, address: &str, limit: u32) -> Result<NotificationHistory, ApiError> {
        let url = self.endpoint("api/notifications")?;
        let limit = limit.to_string();
        let resp = self
            .send(|| {
                self.client
                    .get(url.clone())
                    .query(&[("address", address), ("limit", limit.as_str())])
            })
            .await?;
        let history: NotificationHistory = resp.json().await?;
        if !history.success {
            return Err(ApiError::Rejected(
                history.message.unwrap_or_else(|| "unspecified".to_string()),
            ));
        }
        debug!(
            count = history.notifications.len(),
            unread = history.unread_count,
            "Fetched notification history"
        );
        Ok(history)
    }

    async fn mark_read(&self, id: i64, address: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("api/notifications/{id}/read"))?;
        let body = json!({ "address": address });
        let resp = self.send(|| self.client.post(url.clone()).json(&body)).await?;
        Self::expect_ack(resp).await
    }

    async fn mark_all_read(&self, address: &str) -> Result<(), ApiError> {
        let url = self.endpoint("api/notifications/read-all")?;
        let body = json!({ "address": address });
        let resp = self.send(|| self.client.post(url.clone()).json(&body)).await?;
        Self::expect_ack(resp).await
    }

    async fn delete(&self, id: i64, address: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("api/notifications/{id}"))?;
        let body = json!({ "address": address });
        let resp = self.send(|| self.client.delete(url.clone()).json(&body)).await?;
        Self::expect_ack(resp).await
    }

    async fn delete_all(&self, address: &str) -> Result<(), ApiError> {
        let url = self.endpoint("api/notifications")?;
        let body = json!({ "address": address });
        let resp = self.send(|| self.client.delete(url.clone()).json(&body)).await?;
        Self::expect_ack(resp).await
    }
}
