//! Application-wide constants and configuration values
//!
//! This module centralizes magic numbers, strings, and other constants
//! used across the engine.

/// Remote job polling constants
pub mod job {
    /// Seconds to sleep between job status polls
    pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
}

/// Alert and monitoring constants
pub mod alert {
    /// Maximum length of a message handed to an alert sink
    pub const MAX_MESSAGE_LEN: usize = 1024;

    /// Maximum retry attempts for webhook alerts
    pub const MAX_ALERT_RETRIES: u32 = 3;

    /// Base delay for exponential backoff in seconds
    pub const ALERT_RETRY_BASE_DELAY_SECS: u64 = 1;

    /// HTTP timeout for webhook requests in seconds
    pub const ALERT_HTTP_TIMEOUT_SECS: u64 = 10;
}

/// Wire and document formats
pub mod format {
    /// Timestamp format substituted into query templates (UTC)
    pub const TEMPLATE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";
}
