// src/notify/webhook.rs
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::Notifier;
use crate::config::UpdaterConfig;

/// Incoming-webhook style chat channel: `POST {"text": ...}`.
#[derive(Clone)]
pub struct WebhookNotifier {
    webhook_url: Option<String>,
    client: Client,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: Some(url),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// No webhook configured => sends become no-ops.
    pub fn disabled() -> Self {
        Self {
            webhook_url: None,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(client: Client, cfg: &UpdaterConfig) -> Self {
        Self {
            webhook_url: cfg.webhook_url.clone(),
            client,
            timeout: cfg.notify_timeout(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            tracing::debug!("chat notifications disabled (no webhook_url)");
            return Ok(());
        };

        let body = serde_json::json!({ "text": text });
        self.client
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("webhook post")?
            .error_for_status()
            .context("webhook non-2xx")?;
        Ok(())
    }
}
