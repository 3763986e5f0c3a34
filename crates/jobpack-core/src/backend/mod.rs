//! Execution backend seam.
//!
//! A backend runs a whole batch of command lines as one opaque job and answers
//! non-blocking status queries about the jobs it created.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use jobpack_model::{ExitCode, JobId};

use crate::error::BackendError;

/// Backend-tuned timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Linger window: how long the batcher waits for another task before submitting a partial batch.
    pub queue_delay: Duration,
    /// Maximum staleness of job status observations.
    pub reaper_period: Duration,
}

impl Timings {
    pub const fn new(queue_delay: Duration, reaper_period: Duration) -> Self {
        Self {
            queue_delay,
            reaper_period,
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(5))
    }
}

pub type BackendRef = Arc<dyn Backend>;

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Target batch size, fixed for the lifetime of the process.
    fn optimal_job_size(&self) -> usize;

    fn timings(&self) -> Timings {
        Timings::default()
    }

    /// Submit `command_lines` as a single job and return its identifier.
    async fn schedule_tasks(&self, command_lines: &[String]) -> Result<JobId, BackendError>;

    /// Exit codes of the jobs among `job_ids` that reached a terminal state.
    ///
    /// Jobs that are still running are absent from the result. Never waits for a job.
    async fn job_statuses(
        &self,
        job_ids: &[JobId],
    ) -> Result<HashMap<JobId, ExitCode>, BackendError>;

    /// Called once a job has been reaped; the id will not be queried again.
    fn forget(&self, _job_id: &JobId) {}
}
