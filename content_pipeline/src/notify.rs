use std::time::Duration;

use serde::Serialize;

/// Sent to reviewers when a run leaves posts waiting for approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewNotice {
    pub tenant_id: String,
    pub run_id: String,
    pub article_id: String,
    pub pending_posts: usize,
    pub topic: String,
}

/// Upper bound on a notification. The request is awaited because a Lambda
/// freezes spawned tasks as soon as the handler returns.
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

pub trait Notifier {
    /// Best effort: failures are logged, never reported to the caller.
    fn notify_review(&self, notice: ReviewNotice) -> impl Future<Output = ()> + Send;
}

/// Posts notices to an optional webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: Option<String>,
    timeout: Duration,
}

impl WebhookNotifier {
    pub const fn new(http: reqwest::Client, url: Option<String>) -> Self {
        Self {
            http,
            url,
            timeout: NOTIFY_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Notifier for WebhookNotifier {
    async fn notify_review(&self, notice: ReviewNotice) {
        let Some(url) = &self.url else {
            tracing::debug!(target: "notifications", "no review webhook configured");
            return;
        };

        let request = self.http.post(url).json(&notice).timeout(self.timeout).send();
        match request.await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    target: "notifications",
                    run_id = %notice.run_id,
                    "review notification sent"
                );
            }
            Ok(response) => {
                tracing::warn!(
                    target: "notifications",
                    run_id = %notice.run_id,
                    "review webhook answered {}",
                    response.status()
                );
            }
            Err(e) => {
                tracing::warn!(
                    target: "notifications",
                    run_id = %notice.run_id,
                    "review notification failed: {e}"
                );
            }
        }
    }
}
