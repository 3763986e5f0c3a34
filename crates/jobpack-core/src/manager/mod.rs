use jobpack_model::{ExitCode, JobInfo, Task};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::{
    backend::{BackendRef, Timings},
    batcher::{Batcher, CommandEncoding},
    error::CoreError,
    job::Submission,
    metrics::{MetricsHandle, NoopMetrics},
    reaper::Reaper,
    state::JobTable,
    supervisor::{RestartPolicy, RoleState, Supervised},
};

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Overrides the backend's own timings.
    pub timings: Option<Timings>,
    /// Overrides the backend's optimal job size.
    pub job_size: Option<usize>,
    /// Consecutive failed status queries tolerated before pending jobs are failed.
    pub max_poll_failures: u32,
    pub restart: RestartPolicy,
    pub encoding: CommandEncoding,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            timings: None,
            job_size: None,
            max_poll_failures: 5,
            restart: RestartPolicy::default(),
            encoding: CommandEncoding::default(),
        }
    }
}

/// Entry point of the engine: accepts tasks and owns the supervised batcher and reaper.
///
/// Must be created inside a tokio runtime.
pub struct TaskManager {
    inbound: mpsc::UnboundedSender<Submission>,
    backend: &'static str,
    job_size: usize,
    timings: Timings,
    encoding: CommandEncoding,
    table: JobTable,
    cancel: CancellationToken,
    roles: [Supervised; 2],
}

impl TaskManager {
    pub fn new(backend: BackendRef, cfg: ManagerConfig) -> Self {
        Self::with_metrics(backend, cfg, NoopMetrics::handle())
    }

    pub fn with_metrics(backend: BackendRef, cfg: ManagerConfig, metrics: MetricsHandle) -> Self {
        let job_size = cfg
            .job_size
            .unwrap_or_else(|| backend.optimal_job_size())
            .max(1);
        let timings = cfg.timings.unwrap_or_else(|| backend.timings());
        let table = JobTable::new();
        let cancel = CancellationToken::new();

        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let (handoff, handoff_rx) = mpsc::unbounded_channel();

        let batcher = Batcher::new(
            backend.clone(),
            inbound_rx,
            handoff,
            job_size,
            timings.queue_delay,
            cfg.encoding,
            table.clone(),
            metrics.clone(),
        );
        let reaper = Reaper::new(
            backend.clone(),
            handoff_rx,
            timings.reaper_period,
            cfg.max_poll_failures,
            table.clone(),
            metrics,
        );

        info!(
            backend = backend.name(),
            job_size,
            queue_delay_ms = timings.queue_delay.as_millis() as u64,
            reaper_period_ms = timings.reaper_period.as_millis() as u64,
            "task manager started"
        );

        let roles = [
            Supervised::spawn(batcher, cfg.restart, cancel.child_token()),
            Supervised::spawn(reaper, cfg.restart, cancel.child_token()),
        ];

        Self {
            inbound,
            backend: backend.name(),
            job_size,
            timings,
            encoding: cfg.encoding,
            table,
            cancel,
            roles,
        }
    }

    /// Queue `task` and wait until its job is reaped.
    ///
    /// There is no timeout: the call returns when the job reaches a terminal state. A task the
    /// configured encoding cannot put on one line is refused with [`CoreError::MultiLine`].
    #[instrument(level = "debug", skip(self, task), fields(argc = task.argv.len()))]
    pub async fn submit(&self, task: Task) -> Result<ExitCode, CoreError> {
        if !self.encoding.fits_one_line(&task) {
            return Err(CoreError::MultiLine);
        }
        let (submission, rx) = Submission::new(task);
        self.inbound
            .send(submission)
            .map_err(|_| CoreError::Closed)?;
        let code = rx.await.map_err(|_| CoreError::Abandoned)?;
        debug!(code = code.code(), "task finished");
        Ok(code)
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn job_size(&self) -> usize {
        self.job_size
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    /// In-flight jobs, oldest first.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.table.list()
    }

    pub fn health(&self) -> Vec<(&'static str, RoleState)> {
        self.roles.iter().map(|r| (r.name(), r.state())).collect()
    }

    /// `true` while both loops are running.
    pub fn is_healthy(&self) -> bool {
        self.roles.iter().all(|r| r.state().is_running())
    }

    /// Stop both loops. Tasks still waiting are released with [`CoreError::Abandoned`].
    pub fn shutdown(&self) {
        info!("task manager shutting down");
        self.cancel.cancel();
    }

    /// Wait until both loops have ended.
    pub async fn join(&self) {
        for role in &self.roles {
            role.join().await;
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
