//! Remote job client: submit a query as an asynchronous job, poll until the
//! job reaches its terminal state, and fetch the columnar result.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::alert::{truncate_message, AlertSink, NoopAlert};
use crate::config::ClientSettings;
use crate::constants::job;
use crate::error::EtlResult;
use crate::metrics;
use crate::schema::WireRow;

/// Identifier of a submitted remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

/// Lifecycle state of a remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
}

/// Execution statistics reported for a completed job. Advisory only; never
/// gates pipeline progress.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JobStatistics {
    pub elapsed_ms: Option<u64>,
    pub bytes_processed: Option<u64>,
    pub cache_hit: Option<bool>,
}

/// Snapshot of a job as reported by the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    pub error: Option<String>,
    pub statistics: Option<JobStatistics>,
}

/// Whether a missing destination table is created on submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDisposition {
    CreateIfNeeded,
    Never,
}

/// How results are written into an existing destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    Append,
    Truncate,
}

/// Destination table spec for asynchronous-materialize submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationTable {
    pub dataset: String,
    pub table: String,
    pub create: CreateDisposition,
    pub write: WriteDisposition,
}

impl DestinationTable {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
            create: CreateDisposition::CreateIfNeeded,
            write: WriteDisposition::Append,
        }
    }

    pub fn with_write(mut self, write: WriteDisposition) -> Self {
        self.write = write;
        self
    }
}

/// Columnar result of a completed job: declared column types, string-encoded
/// rows, and the reported total row count.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    /// (column name, declared type) pairs
    pub fields: Vec<(String, String)>,
    pub rows: Vec<WireRow>,
    pub total_rows: u64,
}

/// Abstract contract of the remote query service. Transport and
/// authentication live behind implementations of this trait.
pub trait QueryService: Send + Sync {
    async fn submit_job(
        &self,
        query: &str,
        destination: Option<&DestinationTable>,
    ) -> EtlResult<JobHandle>;

    async fn get_job_status(&self, job: &JobHandle) -> EtlResult<JobStatus>;

    async fn get_job_result(&self, job: &JobHandle) -> EtlResult<JobOutput>;
}

/// A remote job together with its last observed status.
///
/// Mutated only by polling; terminal once the state is [`JobState::Done`].
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub handle: JobHandle,
    pub status: JobStatus,
}

impl Job {
    pub fn id(&self) -> &str {
        &self.handle.job_id
    }

    pub fn is_done(&self) -> bool {
        self.status.state == JobState::Done
    }

    /// Error payload of a completed job, if any.
    pub fn error(&self) -> Option<&str> {
        self.status.error.as_deref()
    }
}

/// Client that drives jobs through the submit/poll/fetch protocol.
///
/// A single client may be reused serially across pipelines; concurrent runs
/// should each hold their own client.
pub struct JobClient<S: QueryService, A: AlertSink = NoopAlert> {
    service: S,
    alert: Option<A>,
    poll_interval: Duration,
}

impl<S: QueryService> JobClient<S, NoopAlert> {
    /// Client without an alert sink.
    pub fn new(service: S) -> Self {
        Self {
            service,
            alert: None,
            poll_interval: Duration::from_secs(job::DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl<S: QueryService, A: AlertSink> JobClient<S, A> {
    /// Client that reports job errors to the given alert sink.
    pub fn with_alerts(service: S, alert: A) -> Self {
        Self {
            service,
            alert: Some(alert),
            poll_interval: Duration::from_secs(job::DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_settings(self, settings: &ClientSettings) -> Self {
        self.with_poll_interval(settings.poll_interval())
    }

    /// Submits a query as an asynchronous job.
    ///
    /// With a destination the job materializes its results into that table
    /// (results are fetched separately, if ever); without one the job's rows
    /// are expected back via [`JobClient::fetch_result`].
    pub async fn submit(
        &self,
        query: &str,
        destination: Option<&DestinationTable>,
    ) -> EtlResult<Job> {
        let handle = self.service.submit_job(query, destination).await?;
        match destination {
            Some(dest) => info!(
                "submitted job {} materializing into {}.{}",
                handle.job_id, dest.dataset, dest.table
            ),
            None => info!("submitted job {}", handle.job_id),
        }
        let status = self.service.get_job_status(&handle).await?;
        Ok(Job { handle, status })
    }

    /// Re-fetches a job's status from the remote service.
    pub async fn poll(&self, job: &Job) -> EtlResult<Job> {
        let status = self.service.get_job_status(&job.handle).await?;
        Ok(Job {
            handle: job.handle.clone(),
            status,
        })
    }

    /// Polls at a fixed interval until the job state is DONE.
    ///
    /// A completed job carrying an error payload is logged and reported to
    /// the alert sink (truncated), but returned rather than raised: the
    /// caller inspects the job and decides whether to halt.
    pub async fn await_completion(&self, mut job: Job) -> EtlResult<Job> {
        let mut polls: u64 = 0;
        while !job.is_done() {
            debug!(
                "job {} is {:?}, next poll in {:?}",
                job.id(),
                job.status.state,
                self.poll_interval
            );
            tokio::time::sleep(self.poll_interval).await;
            job = self.poll(&job).await?;
            polls += 1;
        }
        metrics::job_poll_count(polls);

        if let Some(payload) = job.error() {
            let message = format!("errors encountered in job {}: {}", job.id(), payload);
            error!("{}", message);
            metrics::job_failed();
            if let Some(alert) = &self.alert {
                alert.notify(&truncate_message(&message)).await;
            }
            return Ok(job);
        }

        let stats = job.status.statistics.unwrap_or_default();
        if let Some(elapsed_ms) = stats.elapsed_ms {
            info!("job {} finished in {} ms", job.id(), elapsed_ms);
        }
        if let Some(bytes) = stats.bytes_processed {
            info!("job {} bytes processed: {}", job.id(), bytes);
            metrics::job_bytes_processed(bytes);
        }
        if let Some(cache_hit) = stats.cache_hit {
            info!("job {} cache hit: {}", job.id(), cache_hit);
        }
        metrics::job_completed(stats.cache_hit.unwrap_or(false));

        Ok(job)
    }

    /// Submits a job and blocks until it completes.
    pub async fn run_to_completion(
        &self,
        query: &str,
        destination: Option<&DestinationTable>,
    ) -> EtlResult<Job> {
        let job = self.submit(query, destination).await?;
        self.await_completion(job).await
    }

    /// Fetches the columnar result of a completed job.
    pub async fn fetch_result(&self, job: &Job) -> EtlResult<JobOutput> {
        let output = self.service.get_job_result(&job.handle).await?;
        info!(
            "job {} returned {} rows",
            job.id(),
            output.total_rows
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Service double that reports RUNNING for a fixed number of polls.
    struct ScriptedService {
        polls_until_done: AtomicU32,
        error: Option<String>,
    }

    impl ScriptedService {
        fn completing_after(polls: u32) -> Self {
            Self {
                polls_until_done: AtomicU32::new(polls),
                error: None,
            }
        }

        fn failing_with(error: impl Into<String>) -> Self {
            Self {
                polls_until_done: AtomicU32::new(1),
                error: Some(error.into()),
            }
        }
    }

    impl QueryService for ScriptedService {
        async fn submit_job(
            &self,
            _query: &str,
            _destination: Option<&DestinationTable>,
        ) -> EtlResult<JobHandle> {
            Ok(JobHandle::new("job-1"))
        }

        async fn get_job_status(&self, _job: &JobHandle) -> EtlResult<JobStatus> {
            let remaining = self.polls_until_done.load(Ordering::SeqCst);
            if remaining == 0 {
                return Ok(JobStatus {
                    state: JobState::Done,
                    error: self.error.clone(),
                    statistics: Some(JobStatistics {
                        elapsed_ms: Some(1200),
                        bytes_processed: Some(4096),
                        cache_hit: Some(false),
                    }),
                });
            }
            self.polls_until_done.store(remaining - 1, Ordering::SeqCst);
            Ok(JobStatus {
                state: JobState::Running,
                error: None,
                statistics: None,
            })
        }

        async fn get_job_result(&self, _job: &JobHandle) -> EtlResult<JobOutput> {
            Ok(JobOutput {
                fields: vec![("count".to_string(), "INTEGER".to_string())],
                rows: vec![vec![Some("5".to_string())]],
                total_rows: 1,
            })
        }
    }

    struct RecordingAlert {
        messages: Mutex<Vec<String>>,
    }

    impl AlertSink for RecordingAlert {
        async fn notify(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    fn fast_client<A: AlertSink>(service: ScriptedService, alert: A) -> JobClient<ScriptedService, A> {
        JobClient::with_alerts(service, alert).with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_polls_until_done() {
        let client = JobClient::new(ScriptedService::completing_after(3))
            .with_poll_interval(Duration::from_millis(1));
        let job = client.run_to_completion("SELECT 1", None).await.unwrap();
        assert!(job.is_done());
        assert!(job.error().is_none());
        assert_eq!(job.status.statistics.unwrap().bytes_processed, Some(4096));
    }

    #[tokio::test]
    async fn test_job_error_notifies_alert_sink_without_raising() {
        let alert = RecordingAlert {
            messages: Mutex::new(vec![]),
        };
        let client = fast_client(ScriptedService::failing_with("quota exceeded"), alert);
        let job = client.run_to_completion("SELECT 1", None).await.unwrap();
        assert!(job.is_done());
        assert_eq!(job.error(), Some("quota exceeded"));

        let messages = client.alert.as_ref().unwrap().messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("job-1"));
        assert!(messages[0].contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_alert_message_is_truncated() {
        let alert = RecordingAlert {
            messages: Mutex::new(vec![]),
        };
        let client = fast_client(ScriptedService::failing_with("e".repeat(5000)), alert);
        client.run_to_completion("SELECT 1", None).await.unwrap();

        let messages = client.alert.as_ref().unwrap().messages.lock().unwrap();
        assert_eq!(messages[0].chars().count(), 1024);
    }

    #[tokio::test]
    async fn test_fetch_result() {
        let client = JobClient::new(ScriptedService::completing_after(0))
            .with_poll_interval(Duration::from_millis(1));
        let job = client.run_to_completion("SELECT 1", None).await.unwrap();
        let output = client.fetch_result(&job).await.unwrap();
        assert_eq!(output.total_rows, 1);
        assert_eq!(output.fields[0].1, "INTEGER");
    }
}
