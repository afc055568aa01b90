//! Background scan jobs
//!
//! A job is inserted as pending, its work runs on its own tokio task, and
//! that task alone writes the single terminal transition. Polling never
//! blocks on the work.

use crate::error::{OrchestratorError, Result};
use crate::observability::OrchestratorMetrics;
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Terminal jobs older than this are evicted
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(3600);

/// Error recorded for a job whose work panicked
pub const JOB_PANICKED: &str = "job panicked";

/// Externally visible job state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobView<T> {
    Pending,
    Complete { result: T },
    Error { error: String },
}

impl<T> JobView<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobView::Pending)
    }
}

struct JobRecord<T> {
    state: JobView<T>,
    finished_at: Option<Instant>,
}

/// Random 128-bit identifier, hex encoded
pub fn new_job_id() -> Result<String> {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| OrchestratorError::Internal(format!("failed to generate job id: {e}")))?;
    Ok(hex::encode(bytes))
}

/// In-memory job table
pub struct JobManager<T> {
    jobs: Arc<DashMap<String, JobRecord<T>>>,
    retention: Duration,
    metrics: OrchestratorMetrics,
}

impl<T> Clone for JobManager<T> {
    fn clone(&self) -> Self {
        Self {
            jobs: Arc::clone(&self.jobs),
            retention: self.retention,
            metrics: self.metrics.clone(),
        }
    }
}

impl<T> Default for JobManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_JOB_RETENTION)
    }
}

impl<T> JobManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// `retention` of zero keeps finished jobs until restart
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            retention,
            metrics: OrchestratorMetrics::new(),
        }
    }

    /// Register a pending job and run `work` in the background
    pub fn submit<F>(&self, work: F) -> Result<String>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.evict_expired();

        let id = new_job_id()?;
        self.jobs.insert(
            id.clone(),
            JobRecord {
                state: JobView::Pending,
                finished_at: None,
            },
        );
        self.metrics.inc_jobs_pending();
        info!(job_id = %id, "Started async scan job");

        let jobs = Arc::clone(&self.jobs);
        let metrics = self.metrics.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            // A panicking job still reaches a terminal state
            let state = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(result)) => {
                    debug!(job_id = %job_id, "Job complete");
                    JobView::Complete { result }
                }
                Ok(Err(e)) => {
                    error!(job_id = %job_id, error = %e, "Async scan job failed");
                    JobView::Error {
                        error: e.to_string(),
                    }
                }
                Err(_) => {
                    error!(job_id = %job_id, "Async scan job panicked");
                    JobView::Error {
                        error: JOB_PANICKED.to_string(),
                    }
                }
            };

            if let Some(mut record) = jobs.get_mut(&job_id) {
                record.state = state;
                record.finished_at = Some(Instant::now());
            }
            metrics.dec_jobs_pending();
        });

        Ok(id)
    }

    /// Current state of a job, `None` if unknown
    pub fn poll(&self, id: &str) -> Option<JobView<T>> {
        self.jobs.get(id).map(|record| record.state.clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drop finished jobs past the retention period
    pub fn evict_expired(&self) {
        if self.retention.is_zero() {
            return;
        }
        let retention = self.retention;
        let before = self.jobs.len();
        self.jobs.retain(|_, record| {
            record
                .finished_at
                .map(|at| at.elapsed() < retention)
                .unwrap_or(true)
        });
        let evicted = before.saturating_sub(self.jobs.len());
        if evicted > 0 {
            debug!(evicted = evicted, "Evicted finished jobs");
        }
    }
}
