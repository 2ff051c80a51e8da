// src/job.rs
use async_trait::async_trait;
use metrics::gauge;

use crate::drain::BatchDrainer;
use crate::metrics::LAST_SESSION_TS;
use crate::notify::{Notifier, Reporter};
use crate::refresh::FeedRefresher;
use crate::schedule::ScheduledJob;
use crate::source::WorkSource;

/// One scheduled invocation: drain the outdated feeds, then report.
pub struct RefreshJob<S, R, N> {
    drainer: BatchDrainer<S, R>,
    reporter: Reporter<N>,
}

impl<S, R, N> RefreshJob<S, R, N>
where
    S: WorkSource,
    R: FeedRefresher,
    N: Notifier,
{
    pub fn new(drainer: BatchDrainer<S, R>, reporter: Reporter<N>) -> Self {
        Self { drainer, reporter }
    }

    pub async fn run_once(&self) {
        let session = self.drainer.run_session().await;
        gauge!(LAST_SESSION_TS).set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            batches = session.batches,
            succeeded = session.succeeded,
            recovered = session.recovered,
            failures = session.failures.len(),
            stop = ?session.stop,
            "drain session finished"
        );
        self.reporter.report(&session.failures).await;
    }
}

#[async_trait]
impl<S, R, N> ScheduledJob for RefreshJob<S, R, N>
where
    S: WorkSource,
    R: FeedRefresher,
    N: Notifier,
{
    async fn run(&self) {
        self.run_once().await;
    }
}
