// src/notify/mod.rs
pub mod webhook;

use anyhow::Result;
use metrics::counter;

use crate::metrics::NOTIFY_FAILURES;
use crate::types::FailureRecord;

pub use webhook::WebhookNotifier;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

const GREETING: &str = "🌸 FeedFeeder-chan checking in! 🌸";

/// Render the session summary. Empty `failures` => success message.
pub fn render_report(failures: &[FailureRecord]) -> String {
    if failures.is_empty() {
        return format!(
            "{GREETING}\n\n\
             ✨ **RSS feeds refreshed successfully!**\n\n\
             Every outdated feed was fetched and pushed upstream.\n\
             Nothing stuck this round 🚀"
        );
    }

    let mut msg = format!(
        "{GREETING}\n\n\
         (•﹏•) **RSS refresh finished with some hiccups**\n\n\
         {} feed(s) would not cooperate 🤕\n\n\
         Here are the stubborn ones:\n",
        failures.len()
    );
    for f in failures {
        msg.push_str(&format!("- URL: {} | Error: {}\n", f.url, f.reason));
    }
    msg
}

/// Sends one summary per session. Delivery problems are logged and dropped.
pub struct Reporter<N> {
    notifier: N,
}

impl<N: Notifier> Reporter<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }

    pub async fn report(&self, failures: &[FailureRecord]) {
        let text = render_report(failures);
        if let Err(e) = self.notifier.send(&text).await {
            counter!(NOTIFY_FAILURES).increment(1);
            tracing::warn!("failed to send report: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Capture {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for Capture {
        async fn send(&self, text: &str) -> Result<()> {
            self.sent.lock().push(text.to_string());
            if self.fail {
                return Err(anyhow!("webhook 500"));
            }
            Ok(())
        }
    }

    #[test]
    fn success_template_when_nothing_failed() {
        let msg = render_report(&[]);
        assert!(msg.contains("refreshed successfully"));
        assert!(!msg.contains("URL:"));
    }

    #[test]
    fn failure_template_lists_every_pair() {
        let msg = render_report(&[
            FailureRecord::new("https://a.test/rss", "status 500"),
            FailureRecord::system("No items returned (API timeout or error)"),
        ]);
        assert!(msg.contains("2 feed(s)"));
        assert!(msg.contains("- URL: https://a.test/rss | Error: status 500\n"));
        assert!(msg.contains("- URL: system | Error: No items returned (API timeout or error)\n"));
    }

    #[tokio::test]
    async fn repeated_empty_reports_are_identical() {
        let rep = Reporter::new(Capture::default());
        rep.report(&[]).await;
        rep.report(&[]).await;
        let sent = rep.notifier.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[tokio::test]
    async fn delivery_error_is_swallowed() {
        let rep = Reporter::new(Capture {
            fail: true,
            ..Default::default()
        });
        rep.report(&[FailureRecord::system("Crash: boom")]).await;
        assert_eq!(rep.notifier.sent.lock().len(), 1);
    }
}
