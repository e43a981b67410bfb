//! Centralized metrics module for the ETL engine.
//!
//! This module defines all metrics emitted by the engine, organized into
//! categories: Pipeline, Job, Load, and Alert.

use ::metrics::{counter, histogram};
use std::time::Instant;

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Record a pipeline run start.
pub fn pipeline_run_started(pipeline: &str) {
    counter!("etl_pipeline_runs_total", "pipeline" => pipeline.to_string()).increment(1);
}

/// Record a pipeline run that finished without data.
pub fn pipeline_no_data(pipeline: &str) {
    counter!("etl_pipeline_no_data_total", "pipeline" => pipeline.to_string()).increment(1);
}

/// Record a pipeline error.
pub fn pipeline_error(pipeline: &str, error_kind: &str) {
    counter!(
        "etl_pipeline_errors_total",
        "pipeline" => pipeline.to_string(),
        "error_kind" => error_kind.to_string()
    )
    .increment(1);
}

/// Record a full pipeline run duration.
pub fn pipeline_run_duration(pipeline: &str, duration_secs: f64) {
    histogram!("etl_pipeline_run_duration_seconds", "pipeline" => pipeline.to_string())
        .record(duration_secs);
}

// =============================================================================
// Remote Job Metrics
// =============================================================================

/// Record a completed remote job.
pub fn job_completed(cache_hit: bool) {
    counter!(
        "etl_jobs_completed_total",
        "cache_hit" => if cache_hit { "true" } else { "false" }
    )
    .increment(1);
}

/// Record a remote job that completed with an error payload.
pub fn job_failed() {
    counter!("etl_jobs_failed_total").increment(1);
}

/// Record bytes processed by a remote job.
pub fn job_bytes_processed(bytes: u64) {
    counter!("etl_job_bytes_processed_total").increment(bytes);
}

/// Record the number of status polls a job needed.
pub fn job_poll_count(polls: u64) {
    histogram!("etl_job_polls").record(polls as f64);
}

// =============================================================================
// Load Metrics
// =============================================================================

/// Record rows bulk-inserted into a collection.
pub fn rows_inserted(collection: &str, count: u64) {
    counter!("etl_rows_inserted_total", "collection" => collection.to_string()).increment(count);
}

/// Record upsert outcomes for a collection.
pub fn rows_upserted(collection: &str, updated: u64, inserted: u64) {
    counter!(
        "etl_rows_upserted_total",
        "collection" => collection.to_string(),
        "outcome" => "updated"
    )
    .increment(updated);
    counter!(
        "etl_rows_upserted_total",
        "collection" => collection.to_string(),
        "outcome" => "inserted"
    )
    .increment(inserted);
}

// =============================================================================
// Alert Metrics
// =============================================================================

/// Record a delivered alert.
pub fn alert_sent() {
    counter!("etl_alerts_sent_total").increment(1);
}

/// Record an alert that could not be delivered.
pub fn alert_failed() {
    counter!("etl_alerts_failed_total").increment(1);
}

// =============================================================================
// Timing Helpers
// =============================================================================

/// A simple timer for measuring operation durations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
