// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod drain;
pub mod job;
pub mod metrics;
pub mod notify;
pub mod refresh;
pub mod schedule;
pub mod source;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::config::UpdaterConfig;
pub use crate::drain::{BatchDrainer, Session, StopReason};
pub use crate::job::RefreshJob;
pub use crate::notify::{render_report, Notifier, Reporter, WebhookNotifier};
pub use crate::refresh::{FeedRefresher, HttpFeedRefresher, RefreshError};
pub use crate::schedule::{Clock, ScheduleEntry, ScheduledJob, Scheduler, SystemClock, Timetable};
pub use crate::source::{Batch, HttpWorkSource, WorkSource};
pub use crate::types::{FailureRecord, WorkItem};

use anyhow::{Context, Result};

/// Concrete job wired to the real HTTP collaborators.
pub type HttpRefreshJob = RefreshJob<HttpWorkSource, HttpFeedRefresher, WebhookNotifier>;

/// Build the production job from config. One shared client carries the
/// user-agent; per-call timeouts come from the config.
pub fn build_job(cfg: &UpdaterConfig) -> Result<HttpRefreshJob> {
    let client = reqwest::Client::builder()
        .user_agent(cfg.user_agent.clone())
        .build()
        .context("building http client")?;

    let source = HttpWorkSource::from_config(client.clone(), cfg);
    let refresher = HttpFeedRefresher::from_config(client.clone(), cfg);
    let drainer = BatchDrainer::new(source, refresher).with_batch_limit(cfg.batch_limit);
    let reporter = Reporter::new(WebhookNotifier::from_config(client, cfg));
    Ok(RefreshJob::new(drainer, reporter))
}
