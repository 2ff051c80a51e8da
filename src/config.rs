// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::schedule::{ScheduleEntry, Timetable};

pub const ENV_CONFIG_PATH: &str = "RSS_UPDATER_CONFIG";
pub const ENV_API_BASE: &str = "RSS_UPDATER_API_BASE";
pub const ENV_WEBHOOK_URL: &str = "RSS_UPDATER_WEBHOOK_URL";
pub const DEFAULT_CONFIG_PATH: &str = "config/updater.toml";

fn default_api_base() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_batch_limit() -> usize {
    10
}
fn default_user_agent() -> String {
    "rss-updater/1.0".to_string()
}
fn default_source_timeout() -> u64 {
    15
}
fn default_fetch_timeout() -> u64 {
    20
}
fn default_submit_timeout() -> u64 {
    15
}
fn default_notify_timeout() -> u64 {
    10
}
fn default_schedule() -> Vec<String> {
    ["00:00", "05:00", "09:30", "14:30", "19:00"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdaterConfig {
    /// Base of the news API, e.g. `https://api.example.com/prod`.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Chat webhook; `None` disables notifications.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,
    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_secs: u64,
    /// Daily trigger times as `"HH:MM"` (local time).
    #[serde(default = "default_schedule")]
    pub schedule: Vec<String>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            webhook_url: None,
            batch_limit: default_batch_limit(),
            user_agent: default_user_agent(),
            source_timeout_secs: default_source_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
            submit_timeout_secs: default_submit_timeout(),
            notify_timeout_secs: default_notify_timeout(),
            schedule: default_schedule(),
        }
    }
}

impl UpdaterConfig {
    /// Parse a TOML document and sanitize it.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: UpdaterConfig = toml::from_str(s).context("parsing updater config")?;
        cfg.sanitized()
    }

    /// Load config from an explicit path (TOML).
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading updater config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load config using env var + fallbacks, then apply env overrides:
    /// 1) $RSS_UPDATER_CONFIG (must exist)
    /// 2) config/updater.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
            if fallback.exists() {
                Self::load_from(&fallback)?
            } else {
                Self::default().sanitized()?
            }
        };
        Ok(base.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = non_blank_env(ENV_API_BASE) {
            self.api_base = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = non_blank_env(ENV_WEBHOOK_URL) {
            self.webhook_url = Some(v);
        }
        self
    }

    fn sanitized(mut self) -> Result<Self> {
        self.api_base = self.api_base.trim().trim_end_matches('/').to_string();
        if self.api_base.is_empty() {
            return Err(anyhow!("api_base must not be empty"));
        }
        self.webhook_url = self
            .webhook_url
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty());
        self.batch_limit = self.batch_limit.max(1);
        // Fail early on a bad timetable rather than at the first sleep.
        self.timetable()?;
        Ok(self)
    }

    pub fn timetable(&self) -> Result<Timetable> {
        let entries = self
            .schedule
            .iter()
            .map(|s| s.parse::<ScheduleEntry>())
            .collect::<Result<Vec<_>>>()?;
        Timetable::new(entries)
    }

    pub fn outdated_url(&self) -> String {
        format!("{}/news/all", self.api_base)
    }

    pub fn update_url(&self) -> String {
        format!("{}/news/update", self.api_base)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

fn non_blank_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
