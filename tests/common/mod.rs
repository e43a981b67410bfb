// Common test utilities for ETL Batch end-to-end tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use etl_batch::{
    AlertSink, DestinationTable, EtlError, EtlResult, JobHandle, JobOutput, JobState,
    JobStatistics, JobStatus, QueryService, WireRow,
};

/// Load environment overrides the way the application entrypoints do.
#[allow(dead_code)]
pub fn load_env() {
    dotenvy::dotenv().ok();
}

/// Generate a unique collection name with a UUID suffix
#[allow(dead_code)]
pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

/// Scripted stand-in for the remote query service.
///
/// Reports RUNNING for a fixed number of status polls, then DONE with the
/// scripted error payload or result. Shared state is behind `Arc`s so tests
/// can keep a clone and inspect what the client submitted.
#[derive(Clone)]
pub struct MockWarehouse {
    polls_until_done: Arc<AtomicU32>,
    error: Option<String>,
    output: Option<JobOutput>,
    submitted: Arc<Mutex<Vec<(String, Option<DestinationTable>)>>>,
    result_fetches: Arc<AtomicU32>,
}

impl MockWarehouse {
    pub fn returning(fields: &[(&str, &str)], rows: Vec<WireRow>) -> Self {
        let total_rows = rows.len() as u64;
        Self::scripted(
            None,
            Some(JobOutput {
                fields: fields
                    .iter()
                    .map(|(name, declared)| (name.to_string(), declared.to_string()))
                    .collect(),
                rows,
                total_rows,
            }),
        )
    }

    /// A warehouse whose query completes with zero rows.
    pub fn empty() -> Self {
        Self::scripted(
            None,
            Some(JobOutput {
                fields: vec![],
                rows: vec![],
                total_rows: 0,
            }),
        )
    }

    /// A warehouse whose job completes with an error payload.
    #[allow(dead_code)]
    pub fn failing_with(message: impl Into<String>) -> Self {
        Self::scripted(Some(message.into()), None)
    }

    fn scripted(error: Option<String>, output: Option<JobOutput>) -> Self {
        Self {
            polls_until_done: Arc::new(AtomicU32::new(2)),
            error,
            output,
            submitted: Arc::new(Mutex::new(Vec::new())),
            result_fetches: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn submitted_jobs(&self) -> Vec<(String, Option<DestinationTable>)> {
        self.submitted.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn result_fetches(&self) -> u32 {
        self.result_fetches.load(Ordering::SeqCst)
    }
}

impl QueryService for MockWarehouse {
    async fn submit_job(
        &self,
        query: &str,
        destination: Option<&DestinationTable>,
    ) -> EtlResult<JobHandle> {
        self.submitted
            .lock()
            .unwrap()
            .push((query.to_string(), destination.cloned()));
        Ok(JobHandle::new("job-42"))
    }

    async fn get_job_status(&self, _job: &JobHandle) -> EtlResult<JobStatus> {
        let remaining = self.polls_until_done.load(Ordering::SeqCst);
        if remaining > 0 {
            self.polls_until_done.store(remaining - 1, Ordering::SeqCst);
            return Ok(JobStatus {
                state: if remaining > 1 {
                    JobState::Pending
                } else {
                    JobState::Running
                },
                error: None,
                statistics: None,
            });
        }
        Ok(JobStatus {
            state: JobState::Done,
            error: self.error.clone(),
            statistics: Some(JobStatistics {
                elapsed_ms: Some(1200),
                bytes_processed: Some(2048),
                cache_hit: Some(false),
            }),
        })
    }

    async fn get_job_result(&self, _job: &JobHandle) -> EtlResult<JobOutput> {
        self.result_fetches.fetch_add(1, Ordering::SeqCst);
        self.output
            .clone()
            .ok_or_else(|| EtlError::invalid_data("no result scripted for this job"))
    }
}

/// Alert sink that records every message it receives.
#[derive(Clone, Default)]
pub struct RecordingAlert {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingAlert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlert {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
