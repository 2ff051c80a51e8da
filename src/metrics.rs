// src/metrics.rs
use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;

pub const REFRESH_SUCCESS: &str = "refresh_success_total";
pub const REFRESH_FAILURE: &str = "refresh_failure_total";
pub const DRAIN_BATCHES: &str = "drain_batches_total";
pub const DRAIN_SESSIONS: &str = "drain_sessions_total";
pub const NOTIFY_FAILURES: &str = "notify_failures_total";
pub const LAST_SESSION_TS: &str = "drain_last_session_ts";

/// One-time metrics registration (so series carry descriptions once a recorder is installed).
/// Without a recorder every counter below is a no-op.
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(REFRESH_SUCCESS, "Feeds fetched and accepted by the update sink.");
        describe_counter!(
            REFRESH_FAILURE,
            "Feed refresh attempts that failed (first pass and retry)."
        );
        describe_counter!(DRAIN_BATCHES, "Batches pulled from the work-source and processed.");
        describe_counter!(DRAIN_SESSIONS, "Drain sessions run (startup + scheduled).");
        describe_counter!(NOTIFY_FAILURES, "Chat notifications that could not be delivered.");
        describe_gauge!(LAST_SESSION_TS, "Unix ts when the last drain session finished.");
    });
}
