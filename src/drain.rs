// src/drain.rs
//! Batch-drain retry loop: pull outdated feeds until the source runs dry
//! or a batch stalls completely, retrying each failed feed once.

use futures::FutureExt;
use metrics::counter;
use std::any::Any;
use std::panic::AssertUnwindSafe;

use crate::metrics::{ensure_described, DRAIN_BATCHES, DRAIN_SESSIONS};
use crate::refresh::FeedRefresher;
use crate::source::{Batch, WorkSource};
use crate::types::{FailureRecord, WorkItem};

pub const DEFAULT_BATCH_LIMIT: usize = 10;
pub const EMPTY_FIRST_POLL_REASON: &str = "No items returned (API timeout or error)";

/// Why a session stopped polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Work-source returned nothing (or could not be reached).
    Exhausted,
    /// Work-source flagged an error in its response.
    SourceError,
    /// Every item of the last batch failed on the first pass.
    Stalled,
    /// The loop panicked.
    Crashed,
}

/// Ephemeral state of one drain call.
#[derive(Debug, Default)]
pub struct Session {
    pub failures: Vec<FailureRecord>,
    pub batches: usize,
    pub batch_size: usize,
    pub batch_failed: usize,
    pub succeeded: usize,
    pub recovered: usize,
    pub stop: Option<StopReason>,
}

impl Session {
    /// Items that ended the session refreshed (first try or retry) or failed.
    pub fn processed(&self) -> usize {
        self.succeeded + self.recovered + self.feed_failures()
    }

    fn feed_failures(&self) -> usize {
        self.failures.iter().filter(|f| !f.is_system()).count()
    }
}

pub struct BatchDrainer<S, R> {
    source: S,
    refresher: R,
    batch_limit: usize,
}

impl<S: WorkSource, R: FeedRefresher> BatchDrainer<S, R> {
    pub fn new(source: S, refresher: R) -> Self {
        Self {
            source,
            refresher,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    /// Drain and return every unresolved failure of the session.
    pub async fn drain_until_empty(&self) -> Vec<FailureRecord> {
        self.run_session().await.failures
    }

    /// Like [`drain_until_empty`](Self::drain_until_empty) but keeps the counters.
    /// Never panics; a panic inside the loop becomes a `Crash:` record.
    pub async fn run_session(&self) -> Session {
        ensure_described();
        counter!(DRAIN_SESSIONS).increment(1);

        let mut session = Session::default();
        let outcome = AssertUnwindSafe(self.drain(&mut session))
            .catch_unwind()
            .await;
        if let Err(panic) = outcome {
            let detail = panic_message(panic.as_ref());
            tracing::error!(%detail, "drain loop crashed");
            session
                .failures
                .push(FailureRecord::system(format!("Crash: {detail}")));
            session.stop = Some(StopReason::Crashed);
        }
        session
    }

    async fn drain(&self, session: &mut Session) {
        loop {
            let items = match self.next_batch().await {
                Batch::SourceError(marker) => {
                    tracing::warn!(url = %marker.url, reason = %marker.reason, "work-source reported an error");
                    session.failures.push(marker);
                    session.stop = Some(StopReason::SourceError);
                    return;
                }
                Batch::Items(items) if items.is_empty() => {
                    tracing::info!("no more outdated feeds");
                    // Only the very first poll coming back empty is suspicious.
                    if session.batches == 0 {
                        session
                            .failures
                            .push(FailureRecord::system(EMPTY_FIRST_POLL_REASON));
                    }
                    session.stop = Some(StopReason::Exhausted);
                    return;
                }
                Batch::Items(items) => items,
            };

            session.batches += 1;
            session.batch_size = items.len();
            counter!(DRAIN_BATCHES).increment(1);
            tracing::info!(batch = session.batches, size = items.len(), "found outdated feeds");

            let first_pass = self.process(&items).await;
            session.batch_failed = first_pass.len();
            session.succeeded += items.len() - first_pass.len();

            if !first_pass.is_empty() {
                self.retry(first_pass, session).await;
            }

            if session.batch_failed == session.batch_size {
                tracing::warn!(
                    size = session.batch_size,
                    "every item in the batch failed; stopping"
                );
                session.stop = Some(StopReason::Stalled);
                return;
            }
        }
    }

    async fn next_batch(&self) -> Batch {
        match self.source.fetch_outdated(self.batch_limit).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "failed to fetch outdated feeds");
                Batch::empty()
            }
        }
    }

    async fn process(&self, items: &[WorkItem]) -> Vec<FailureRecord> {
        let mut failed = Vec::new();
        for item in items {
            if let Err(e) = self.refresher.refresh(item).await {
                failed.push(FailureRecord::new(item.url.clone(), e.to_string()));
            }
        }
        failed
    }

    // A feed that fails again is recorded with the retry's reason, not the first one.
    async fn retry(&self, first_pass: Vec<FailureRecord>, session: &mut Session) {
        tracing::warn!(count = first_pass.len(), "feeds failed, retrying once");
        let mut still_failed = Vec::new();
        for failed in first_pass {
            let item = WorkItem::new(failed.url);
            match self.refresher.refresh(&item).await {
                Ok(()) => session.recovered += 1,
                Err(e) => still_failed.push(FailureRecord::new(item.url, e.to_string())),
            }
        }

        if still_failed.is_empty() {
            tracing::info!("all failed feeds succeeded on retry");
        } else {
            tracing::warn!(count = still_failed.len(), "feeds could not be updated");
            session.failures.extend(still_failed);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::RefreshError;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    /// Hands out pre-scripted batches, then empty ones.
    struct ScriptedSource {
        polls: Mutex<VecDeque<Result<Batch>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedSource {
        fn new(polls: Vec<Result<Batch>>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl WorkSource for ScriptedSource {
        async fn fetch_outdated(&self, limit: usize) -> Result<Batch> {
            assert_eq!(limit, DEFAULT_BATCH_LIMIT);
            *self.calls.lock() += 1;
            self.polls.lock().pop_front().unwrap_or(Ok(Batch::empty()))
        }
    }

    /// Per-url queue of outcomes; urls without a script succeed.
    #[derive(Default)]
    struct ScriptedRefresher {
        outcomes: Mutex<HashMap<String, VecDeque<Result<(), RefreshError>>>>,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedRefresher {
        fn script(self, url: &str, outcomes: Vec<Result<(), RefreshError>>) -> Self {
            self.outcomes.lock().insert(url.to_string(), outcomes.into());
            self
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().clone()
        }
    }

    #[async_trait]
    impl FeedRefresher for ScriptedRefresher {
        async fn refresh(&self, item: &WorkItem) -> Result<(), RefreshError> {
            self.attempts.lock().push(item.url.clone());
            if item.url == "panic" {
                panic!("refresher blew up");
            }
            if item.url.is_empty() {
                return Err(RefreshError::MissingUrl);
            }
            self.outcomes
                .lock()
                .get_mut(&item.url)
                .and_then(|q| q.pop_front())
                .unwrap_or(Ok(()))
        }
    }

    fn items(urls: &[&str]) -> Result<Batch> {
        Ok(Batch::Items(urls.iter().map(|u| WorkItem::new(*u)).collect()))
    }

    fn status(code: u16) -> Result<(), RefreshError> {
        Err(RefreshError::SubmitStatus(code))
    }

    #[tokio::test]
    async fn empty_first_poll_yields_single_system_record() {
        let d = BatchDrainer::new(ScriptedSource::new(vec![]), ScriptedRefresher::default());
        let s = d.run_session().await;
        assert_eq!(s.failures, vec![FailureRecord::system(EMPTY_FIRST_POLL_REASON)]);
        assert_eq!(s.stop, Some(StopReason::Exhausted));
        assert_eq!(s.batches, 0);
    }

    #[tokio::test]
    async fn unreachable_source_counts_as_empty() {
        let src = ScriptedSource::new(vec![Err(anyhow!("connect timeout"))]);
        let d = BatchDrainer::new(src, ScriptedRefresher::default());
        let failures = d.drain_until_empty().await;
        assert_eq!(failures.len(), 1);
        assert!(failures[0].is_system());
    }

    #[tokio::test]
    async fn successful_batches_poll_again_without_sentinel() {
        let src = ScriptedSource::new(vec![items(&["a", "b"]), items(&["c"])]);
        let d = BatchDrainer::new(src, ScriptedRefresher::default());
        let s = d.run_session().await;
        assert!(s.failures.is_empty(), "{:?}", s.failures);
        assert_eq!(s.batches, 2);
        assert_eq!(s.succeeded, 3);
        assert_eq!(d.source.calls(), 3);
        assert_eq!(s.stop, Some(StopReason::Exhausted));
    }

    #[tokio::test]
    async fn source_failure_after_progress_adds_no_sentinel() {
        let src = ScriptedSource::new(vec![items(&["a"]), Err(anyhow!("503"))]);
        let d = BatchDrainer::new(src, ScriptedRefresher::default());
        assert!(d.drain_until_empty().await.is_empty());
    }

    #[tokio::test]
    async fn partial_failures_recovered_on_retry() {
        let src = ScriptedSource::new(vec![items(&["a", "b", "c"])]);
        let r = ScriptedRefresher::default()
            .script("a", vec![status(500), Ok(())])
            .script("c", vec![Err(RefreshError::Fetch("timeout".into())), Ok(())]);
        let d = BatchDrainer::new(src, r);
        let s = d.run_session().await;
        assert!(s.failures.is_empty(), "{:?}", s.failures);
        assert_eq!(s.recovered, 2);
        assert_eq!(d.refresher.attempts(), vec!["a", "b", "c", "a", "c"]);
        // partial failure does not stall: the source is polled again
        assert_eq!(d.source.calls(), 2);
    }

    #[tokio::test]
    async fn empty_poll_after_recovered_batches_is_clean_exhaustion() {
        let src = ScriptedSource::new(vec![items(&["a", "b"]), items(&["c", "d"])]);
        let r = ScriptedRefresher::default()
            .script("a", vec![status(500), Ok(())])
            .script("d", vec![status(502), Ok(())]);
        let d = BatchDrainer::new(src, r);
        let s = d.run_session().await;
        assert!(s.failures.is_empty(), "{:?}", s.failures);
        assert_eq!(s.stop, Some(StopReason::Exhausted));
        assert_eq!(s.batches, 2);
        assert_eq!(s.recovered, 2);
        assert_eq!(d.source.calls(), 3);
    }

    #[tokio::test]
    async fn empty_poll_after_progress_keeps_only_feed_failures() {
        let src = ScriptedSource::new(vec![items(&["a", "b"])]);
        let r = ScriptedRefresher::default().script("a", vec![status(500), status(500)]);
        let d = BatchDrainer::new(src, r);
        let s = d.run_session().await;
        assert_eq!(s.failures, vec![FailureRecord::new("a", "status 500")]);
        assert!(s.failures.iter().all(|f| !f.is_system()));
        assert_eq!(s.stop, Some(StopReason::Exhausted));
    }

    #[tokio::test]
    async fn retry_failure_records_fresh_reason() {
        let src = ScriptedSource::new(vec![items(&["a", "b"])]);
        let r = ScriptedRefresher::default().script("a", vec![status(500), status(503)]);
        let d = BatchDrainer::new(src, r);
        let failures = d.drain_until_empty().await;
        assert_eq!(failures, vec![FailureRecord::new("a", "status 503")]);
    }

    #[tokio::test]
    async fn whole_batch_failing_stops_even_if_retry_succeeds() {
        let src = ScriptedSource::new(vec![items(&["a", "b"]), items(&["never"])]);
        let r = ScriptedRefresher::default()
            .script("a", vec![status(500), Ok(())])
            .script("b", vec![status(500), status(500)]);
        let d = BatchDrainer::new(src, r);
        let s = d.run_session().await;
        assert_eq!(s.stop, Some(StopReason::Stalled));
        assert_eq!(s.failures, vec![FailureRecord::new("b", "status 500")]);
        assert_eq!(d.source.calls(), 1);
        assert!(!d.refresher.attempts().contains(&"never".to_string()));
    }

    #[tokio::test]
    async fn source_error_marker_terminates() {
        let marker = FailureRecord::system("upstream scan failed");
        let src = ScriptedSource::new(vec![
            Ok(Batch::SourceError(marker.clone())),
            items(&["a"]),
        ]);
        let d = BatchDrainer::new(src, ScriptedRefresher::default());
        let s = d.run_session().await;
        assert_eq!(s.failures, vec![marker]);
        assert_eq!(s.stop, Some(StopReason::SourceError));
        assert!(d.refresher.attempts().is_empty());
    }

    #[tokio::test]
    async fn missing_url_items_fail_twice_and_stall() {
        let src = ScriptedSource::new(vec![items(&[""])]);
        let d = BatchDrainer::new(src, ScriptedRefresher::default());
        let failures = d.drain_until_empty().await;
        assert_eq!(failures, vec![FailureRecord::new("", "missing url")]);
        assert_eq!(d.refresher.attempts().len(), 2);
    }

    #[tokio::test]
    async fn panic_becomes_crash_record_and_keeps_partial_failures() {
        let src = ScriptedSource::new(vec![items(&["a", "b"]), items(&["panic"])]);
        let r = ScriptedRefresher::default().script("a", vec![status(500), status(500)]);
        let d = BatchDrainer::new(src, r);
        let s = d.run_session().await;
        assert_eq!(s.stop, Some(StopReason::Crashed));
        assert_eq!(
            s.failures,
            vec![
                FailureRecord::new("a", "status 500"),
                FailureRecord::system("Crash: refresher blew up"),
            ]
        );
    }

    #[tokio::test]
    async fn every_item_ends_in_exactly_one_terminal_state() {
        let src = ScriptedSource::new(vec![
            items(&["a", "b", "c", "d"]),
            items(&["e", "f"]),
            items(&["g"]),
        ]);
        let r = ScriptedRefresher::default()
            .script("b", vec![status(500), Ok(())])
            .script("d", vec![status(404), status(404)])
            .script("f", vec![status(500), status(500)])
            .script("g", vec![status(500), Ok(())]);
        let d = BatchDrainer::new(src, r);
        let s = d.run_session().await;
        // g is the whole third batch -> stall after it
        assert_eq!(s.stop, Some(StopReason::Stalled));
        assert_eq!(s.succeeded, 3); // a, c, e
        assert_eq!(s.recovered, 2); // b, g
        assert_eq!(s.failures.len(), 2); // d, f
        assert_eq!(s.processed(), 7);
    }

    #[test]
    fn panic_message_handles_both_payload_kinds() {
        let a: Box<dyn Any + Send> = Box::new("static");
        let b: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let c: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(a.as_ref()), "static");
        assert_eq!(panic_message(b.as_ref()), "owned");
        assert_eq!(panic_message(c.as_ref()), "unknown panic");
    }
}
