// src/types.rs
use serde::{Deserialize, Serialize};

/// Url used on failures that are not attributable to a single feed.
pub const SYSTEM_URL: &str = "system";

/// One outdated feed handed out by the work-source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Missing in the payload => empty, which the refresher rejects.
    #[serde(default)]
    pub url: String,
}

impl WorkItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Why a feed (or the whole run) could not be refreshed this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub url: String,
    pub reason: String,
}

impl FailureRecord {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn system(reason: impl Into<String>) -> Self {
        Self::new(SYSTEM_URL, reason)
    }

    pub fn is_system(&self) -> bool {
        self.url == SYSTEM_URL
    }
}
