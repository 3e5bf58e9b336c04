//! Notifier external collaborator: three severity channels, free-form
//! text, best-effort delivery.

mod webhook;

pub use webhook::WebhookNotifier;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational, orange.
    Update,
    /// Failure, red.
    Error,
    /// Success, green.
    Success,
}

impl Severity {
    pub fn color(self) -> &'static str {
        match self {
            Severity::Update => "#FFA500",
            Severity::Error => "#FF0000",
            Severity::Success => "#00FF00",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `text` on `severity`. Delivery is best-effort: implementations
    /// log and swallow failures rather than propagating them, and must
    /// check the `DEBUG` environment flag at call time rather than at
    /// construction, so suppression can be toggled per-call in tests.
    async fn send(&self, severity: Severity, text: &str);
}

/// True when the `DEBUG` environment variable is set to any value,
/// globally suppressing outbound notifications. Checked at send time.
pub fn suppressed() -> bool {
    std::env::var_os("DEBUG").is_some()
}
