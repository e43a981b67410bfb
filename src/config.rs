use std::env;
use std::time::Duration;

use tracing::warn;

use crate::constants::job;
use crate::error::{EtlError, EtlResult};

/// Remote job client settings
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Seconds to sleep between job status polls
    pub poll_interval_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: job::DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl ClientSettings {
    /// Load client settings from environment variables with validation
    pub fn from_env() -> EtlResult<Self> {
        let poll_interval = match env::var("ETL_JOB_POLL_INTERVAL_SECS") {
            Ok(raw) => raw.parse().map_err(|_| {
                EtlError::invalid_params(format!(
                    "ETL_JOB_POLL_INTERVAL_SECS must be an integer, got: {}",
                    raw
                ))
            })?,
            Err(_) => job::DEFAULT_POLL_INTERVAL_SECS,
        };

        // Validate poll interval (must be positive and reasonable)
        if poll_interval == 0 {
            return Err(EtlError::invalid_params(
                "ETL_JOB_POLL_INTERVAL_SECS must be greater than 0",
            ));
        }
        if poll_interval > 300 {
            return Err(EtlError::invalid_params(
                "ETL_JOB_POLL_INTERVAL_SECS must be 300 seconds (5 minutes) or less",
            ));
        }
        if poll_interval > 60 {
            warn!(
                "ETL_JOB_POLL_INTERVAL_SECS is set to {} seconds, completed jobs may sit unnoticed",
                poll_interval
            );
        }

        Ok(Self {
            poll_interval_secs: poll_interval,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Alert webhook settings
#[derive(Debug, Clone)]
pub struct AlertSettings {
    /// Webhook URL to send alerts (feature disabled if None)
    pub webhook_url: Option<String>,
}

impl AlertSettings {
    pub fn from_env() -> EtlResult<Self> {
        let webhook_url = env::var("ETL_ALERT_WEBHOOK_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        // Validate URL format if provided
        if let Some(ref url) = webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(EtlError::invalid_params(format!(
                    "ETL_ALERT_WEBHOOK_URL must be a valid HTTP/HTTPS URL, got: {}",
                    url
                )));
            }
        }

        Ok(Self { webhook_url })
    }

    /// Check if alerting is enabled
    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}
