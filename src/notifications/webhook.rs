use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::{suppressed, Notifier, Severity};

/// Posts a Slack-compatible `{"attachments":[...]}` body to a configured
/// webhook URL.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { url: url.into(), client })
    }

    async fn post(&self, severity: Severity, text: &str) -> anyhow::Result<()> {
        let body = json!({
            "attachments": [{
                "color": severity.color(),
                "text": text,
                "ts": chrono::Utc::now().timestamp(),
            }]
        });
        self.client.post(&self.url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, severity: Severity, text: &str) {
        if suppressed() {
            debug!("DEBUG set, suppressing notification: {}", text);
            return;
        }
        if let Err(e) = self.post(severity, text).await {
            warn!("failed to post notification to webhook: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_colors_match_the_three_channels() {
        assert_eq!(Severity::Update.color(), "#FFA500");
        assert_eq!(Severity::Error.color(), "#FF0000");
        assert_eq!(Severity::Success.color(), "#00FF00");
    }

    #[test]
    fn debug_env_suppresses_sends() {
        // SAFETY: test-only, single-threaded within this process's test
        // harness for this variable.
        unsafe { std::env::set_var("DEBUG", "1") };
        assert!(suppressed());
        unsafe { std::env::remove_var("DEBUG") };
        assert!(!suppressed());
    }
}
