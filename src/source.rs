// src/source.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::config::UpdaterConfig;
use crate::types::{FailureRecord, WorkItem, SYSTEM_URL};

/// One poll of the work-source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Batch {
    Items(Vec<WorkItem>),
    /// The source flagged its own failure in the first element.
    SourceError(FailureRecord),
}

impl Batch {
    pub fn empty() -> Self {
        Batch::Items(Vec::new())
    }
}

#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Up to `limit` feeds currently flagged as outdated.
    async fn fetch_outdated(&self, limit: usize) -> Result<Batch>;
}

/// Interpret the work-source response body.
///
/// Only the outer array is strict. Elements are read leniently: a missing or
/// non-string `url` becomes an empty url (refused later as "missing url"),
/// and an `error` key on the first element marks a source-side failure
/// whatever its value.
pub fn parse_batch(body: &str) -> Result<Batch> {
    let entries: Vec<Value> = serde_json::from_str(body).context("parse outdated feeds JSON")?;

    if let Some(marker) = entries.first().and_then(error_marker) {
        return Ok(Batch::SourceError(marker));
    }

    Ok(Batch::Items(
        entries.iter().map(|e| WorkItem::new(url_of(e))).collect(),
    ))
}

fn url_of(entry: &Value) -> String {
    entry
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn error_marker(entry: &Value) -> Option<FailureRecord> {
    let err = entry.as_object()?.get("error")?;
    let reason = match err {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let url = url_of(entry);
    let url = if url.is_empty() { SYSTEM_URL.to_string() } else { url };
    Some(FailureRecord::new(url, reason))
}

/// `GET <api_base>/news/all?limit=N`.
#[derive(Clone)]
pub struct HttpWorkSource {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpWorkSource {
    pub fn new(client: Client, endpoint: String) -> Self {
        Self {
            client,
            endpoint,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn from_config(client: Client, cfg: &UpdaterConfig) -> Self {
        Self::new(client, cfg.outdated_url()).with_timeout(cfg.source_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl WorkSource for HttpWorkSource {
    async fn fetch_outdated(&self, limit: usize) -> Result<Batch> {
        let body = self
            .client
            .get(&self.endpoint)
            .query(&[("limit", limit)])
            .timeout(self.timeout)
            .send()
            .await
            .context("fetch outdated feeds")?
            .error_for_status()
            .context("outdated feeds non-2xx")?
            .text()
            .await
            .context("read outdated feeds body")?;
        parse_batch(&body)
    }
}
