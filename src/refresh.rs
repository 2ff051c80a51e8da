// src/refresh.rs
use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::UpdaterConfig;
use crate::metrics::{REFRESH_FAILURE, REFRESH_SUCCESS};
use crate::types::WorkItem;

/// Why a single feed could not be refreshed. `Display` is the reason
/// string that ends up in the session report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("missing url")]
    MissingUrl,
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("status {0}")]
    SubmitStatus(u16),
    #[error("{0}")]
    Submit(String),
}

#[async_trait]
pub trait FeedRefresher: Send + Sync {
    async fn refresh(&self, item: &WorkItem) -> Result<(), RefreshError>;
}

#[derive(Serialize)]
struct UpdatePayload<'a> {
    #[serde(rename = "Url")]
    url: &'a str,
    #[serde(rename = "Data")]
    data: &'a str,
}

/// Pulls a feed from its origin and pushes the raw body to the update sink.
#[derive(Clone)]
pub struct HttpFeedRefresher {
    client: Client,
    update_url: String,
    fetch_timeout: Duration,
    submit_timeout: Duration,
}

impl HttpFeedRefresher {
    pub fn new(client: Client, update_url: String) -> Self {
        Self {
            client,
            update_url,
            fetch_timeout: Duration::from_secs(20),
            submit_timeout: Duration::from_secs(15),
        }
    }

    pub fn from_config(client: Client, cfg: &UpdaterConfig) -> Self {
        Self::new(client, cfg.update_url())
            .with_fetch_timeout(cfg.fetch_timeout())
            .with_submit_timeout(cfg.submit_timeout())
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    async fn fetch_fresh(&self, url: &str) -> Result<String, RefreshError> {
        let resp = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RefreshError::Fetch(e.to_string()))?;
        resp.text()
            .await
            .map_err(|e| RefreshError::Fetch(e.to_string()))
    }

    async fn submit(&self, url: &str, data: &str) -> Result<(), RefreshError> {
        let resp = self
            .client
            .post(&self.update_url)
            .timeout(self.submit_timeout)
            .json(&UpdatePayload { url, data })
            .send()
            .await
            .map_err(|e| RefreshError::Submit(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => Ok(()),
            other => Err(RefreshError::SubmitStatus(other.as_u16())),
        }
    }

    async fn try_refresh(&self, url: &str) -> Result<(), RefreshError> {
        if url.is_empty() {
            return Err(RefreshError::MissingUrl);
        }
        let fresh = self.fetch_fresh(url).await?;
        self.submit(url, &fresh).await
    }
}

#[async_trait]
impl FeedRefresher for HttpFeedRefresher {
    async fn refresh(&self, item: &WorkItem) -> Result<(), RefreshError> {
        let res = self.try_refresh(&item.url).await;
        match &res {
            Ok(()) => {
                counter!(REFRESH_SUCCESS).increment(1);
                tracing::info!(url = %item.url, "updated feed");
            }
            Err(e) => {
                counter!(REFRESH_FAILURE).increment(1);
                tracing::warn!(url = %item.url, reason = %e, "feed refresh failed");
            }
        }
        res
    }
}
