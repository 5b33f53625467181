//! Push notification delivery.
//!
//! The `NotificationSink` trait separates message formatting from the
//! transport; production uses Pushover, tests use in-memory sinks. Delivery
//! is best-effort: a failed push is reported to the caller but never undoes
//! the already-persisted opportunity.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::types::{DealhawkError, Opportunity};

const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Characters of the deal description included in the alert body.
const MESSAGE_DESCRIPTION_CHARS: usize = 200;

/// Transport for outbound alerts.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, title: &str, message: &str, url: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Pushover
// ---------------------------------------------------------------------------

pub struct PushoverClient {
    http: Client,
    token: String,
    user: String,
}

impl PushoverClient {
    pub fn new(token: String, user: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build Pushover HTTP client")?;
        Ok(Self { http, token, user })
    }
}

#[async_trait]
impl NotificationSink for PushoverClient {
    async fn send(&self, title: &str, message: &str, url: &str) -> Result<()> {
        let params = [
            ("token", self.token.as_str()),
            ("user", self.user.as_str()),
            ("title", title),
            ("message", message),
            ("url", url),
        ];

        let response = self
            .http
            .post(PUSHOVER_API_URL)
            .form(&params)
            .send()
            .await
            .context("Pushover request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Pushover returned HTTP {status}: {body}");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Formats opportunities into alerts and pushes them through the sink.
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Alert body: prices, discount, and a clipped description.
    fn format_message(opportunity: &Opportunity) -> String {
        let description: String = opportunity
            .deal
            .description
            .chars()
            .take(MESSAGE_DESCRIPTION_CHARS)
            .collect();
        format!(
            "Listed at ${:.2}, estimated worth ${:.2} (${:.2} below estimate).\n{}",
            opportunity.deal.listed_price,
            opportunity.combined_estimate.price,
            opportunity.discount(),
            description,
        )
    }

    pub async fn notify(&self, opportunity: &Opportunity) -> Result<()> {
        let title = format!("Deal alert: ${:.2} off", opportunity.discount());
        let message = Self::format_message(opportunity);

        match self
            .sink
            .send(&title, &message, &opportunity.deal.url)
            .await
        {
            Ok(()) => {
                info!(url = %opportunity.deal.url, "Alert delivered");
                Ok(())
            }
            Err(e) => {
                warn!(url = %opportunity.deal.url, error = %e, "Alert delivery failed");
                Err(DealhawkError::Notify(e.to_string()).into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CombinedEstimate, Deal};
    use std::sync::Mutex;

    struct RecordingSink {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send(&self, title: &str, message: &str, url: &str) -> Result<()> {
            if self.fail {
                anyhow::bail!("sink down");
            }
            self.sent
                .lock()
                .unwrap()
                .push((title.into(), message.into(), url.into()));
            Ok(())
        }
    }

    fn opportunity() -> Opportunity {
        Opportunity::new(
            Deal::sample(),
            CombinedEstimate {
                price: 250.0,
                components: vec![("specialist".into(), 250.0), ("frontier".into(), 250.0)],
                min: 250.0,
                max: 250.0,
            },
        )
    }

    #[test]
    fn test_format_message_contents() {
        let message = Notifier::format_message(&opportunity());
        assert!(message.contains("$178.00"));
        assert!(message.contains("$250.00"));
        assert!(message.contains("$72.00"));
        assert!(message.contains("smart TV"));
    }

    #[test]
    fn test_format_message_clips_description() {
        let mut opp = opportunity();
        opp.deal.description = "y".repeat(1500);
        let message = Notifier::format_message(&opp);
        assert!(message.chars().count() < 1500);
    }

    #[tokio::test]
    async fn test_notify_sends_through_sink() {
        let sink = Arc::new(RecordingSink {
            sent: Mutex::new(Vec::new()),
            fail: false,
        });
        let notifier = Notifier::new(sink.clone());

        notifier.notify(&opportunity()).await.unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("$72.00"));
        assert_eq!(sent[0].2, "https://deals.example.com/tv-55-4k");
    }

    #[tokio::test]
    async fn test_notify_surfaces_sink_failure() {
        let sink = Arc::new(RecordingSink {
            sent: Mutex::new(Vec::new()),
            fail: true,
        });
        let notifier = Notifier::new(sink);

        let err = notifier.notify(&opportunity()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DealhawkError>(),
            Some(DealhawkError::Notify(_))
        ));
    }
}
