//! Alerting sinks for irrecoverable job and pipeline failures.
//!
//! A sink receives a short message when a remote job completes with an error
//! payload. Delivery failures are logged and retried a bounded number of
//! times; they never propagate into the pipeline.

use std::borrow::Cow;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use crate::config::AlertSettings;
use crate::constants::alert;
use crate::metrics;

/// A callback invoked with an error message when a job or pipeline step
/// fails irrecoverably.
pub trait AlertSink: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Caps a message at the sink limit, preserving character boundaries.
pub fn truncate_message(message: &str) -> Cow<'_, str> {
    if message.chars().count() <= alert::MAX_MESSAGE_LEN {
        Cow::Borrowed(message)
    } else {
        Cow::Owned(message.chars().take(alert::MAX_MESSAGE_LEN).collect())
    }
}

/// Webhook notification payload
#[derive(Debug, Clone, Serialize)]
struct AlertPayload {
    #[serde(rename = "type")]
    alert_type: &'static str,
    message: String,
    timestamp: String,
}

/// Sink that POSTs alerts to a webhook URL.
pub struct WebhookAlerter {
    url: String,
    http_client: Client,
}

impl WebhookAlerter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http_client: Client::new(),
        }
    }

    /// Create a new WebhookAlerter if alerting is enabled
    pub fn from_settings(settings: &AlertSettings) -> Option<Self> {
        let Some(url) = settings.webhook_url.as_ref() else {
            info!("job alerting disabled (ETL_ALERT_WEBHOOK_URL not set)");
            return None;
        };
        info!("job alerting enabled - URL: {}", url);
        Some(Self::new(url.clone()))
    }
}

impl AlertSink for WebhookAlerter {
    async fn notify(&self, message: &str) {
        let payload = AlertPayload {
            alert_type: "etl_job_error",
            message: message.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };

        // Retry logic with exponential backoff
        let max_retries = alert::MAX_ALERT_RETRIES;
        let mut attempt = 0;

        while attempt < max_retries {
            let request = self
                .http_client
                .post(&self.url)
                .json(&payload)
                .timeout(Duration::from_secs(alert::ALERT_HTTP_TIMEOUT_SECS));
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!("alert delivered (attempt {})", attempt + 1);
                    metrics::alert_sent();
                    return;
                }
                Ok(response) => {
                    error!(
                        "alert request failed: HTTP {} (attempt {})",
                        response.status(),
                        attempt + 1
                    );
                }
                Err(e) => {
                    error!("failed to send alert: {} (attempt {})", e, attempt + 1);
                }
            }

            attempt += 1;
            if attempt < max_retries {
                // Exponential backoff: 1s, 2s, 4s
                let delay =
                    Duration::from_secs(alert::ALERT_RETRY_BASE_DELAY_SECS << (attempt - 1));
                tokio::time::sleep(delay).await;
            }
        }

        error!("failed to deliver alert after {} attempts", max_retries);
        metrics::alert_failed();
    }
}

/// Sink for callers that do not want alerting.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAlert;

impl AlertSink for NoopAlert {
    async fn notify(&self, _message: &str) {}
}
