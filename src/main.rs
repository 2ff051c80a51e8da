//! RSS live updater — binary entrypoint.
//! Refreshes outdated feeds once at startup, then on the fixed daily timetable.

use anyhow::Result;
use rss_live_updater::{build_job, Scheduler, SystemClock, UpdaterConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rss_live_updater=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = UpdaterConfig::load_default()?;
    if cfg.webhook_url.is_none() {
        tracing::warn!("no webhook_url configured; reports will only be logged");
    }
    tracing::info!(api_base = %cfg.api_base, batch_limit = cfg.batch_limit, "config loaded");

    let scheduler = Scheduler::new(cfg.timetable()?, SystemClock, build_job(&cfg)?);
    scheduler.run_forever().await;
    Ok(())
}
