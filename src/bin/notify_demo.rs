//! Sends a sample success and failure report through the configured webhook
//! (log only when no webhook is set). Handy for checking the chat channel wiring.

use rss_live_updater::{
    render_report, FailureRecord, Reporter, UpdaterConfig, WebhookNotifier,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = UpdaterConfig::load_default()?;
    let notifier = WebhookNotifier::from_config(reqwest::Client::new(), &cfg);
    if !notifier.is_enabled() {
        tracing::warn!("no webhook_url configured; printing reports instead");
    }
    let reporter = Reporter::new(notifier);

    let samples = [
        Vec::new(),
        vec![
            FailureRecord::new("https://feeds.example.com/world.xml", "status 502"),
            FailureRecord::system("No items returned (API timeout or error)"),
        ],
    ];

    for failures in samples {
        println!("{}\n", render_report(&failures));
        reporter.report(&failures).await;
    }

    println!("notify-demo done");
    Ok(())
}
