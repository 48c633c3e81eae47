use async_trait::async_trait;
use tracing::{debug, warn};

use crate::protocol::DwellReport;

pub const DEFAULT_REPORT_ENDPOINT: &str = "http://127.0.0.1:5000/log";

/// Best-effort delivery of dwell reports to an outside listener. At most once, no retries, and
/// failures never reach the caller.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, report: &DwellReport);
}

/// Posts reports as JSON to a fixed endpoint.
pub struct HttpNotifier {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_ENDPOINT)
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, report: &DwellReport) {
        let result = self
            .client
            .post(&self.endpoint)
            .json(report)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        match result {
            Ok(_) => debug!("Delivered report for {} to {}", report.domain, self.endpoint),
            Err(e) => warn!("Failed to deliver report to {}: {e}", self.endpoint),
        }
    }
}

/// For observers that have nobody to tell.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _report: &DwellReport) {}
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::protocol::DwellReport;

    use super::{HttpNotifier, Notifier};

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        // Port 9 (discard) is closed on any sane test machine.
        let notifier = HttpNotifier::new("http://127.0.0.1:9/log");
        notifier
            .notify(&DwellReport {
                domain: "example.com".into(),
                seconds: 5,
                ts: Utc::now(),
            })
            .await;
    }
}
