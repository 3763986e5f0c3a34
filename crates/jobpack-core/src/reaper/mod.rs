//! Completion polling and result fan-out.
//!
//! The reaper owns every in-flight job. While it has none it blocks on the hand-off queue;
//! otherwise it polls the backend at most `reaper_period` after the previous poll and delivers
//! each terminal job's exit code to all of the job's tasks.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use jobpack_model::{ExitCode, JobId};
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until, timeout_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    backend::BackendRef,
    error::CoreError,
    job::{Job, Submission, deliver_all},
    metrics::MetricsHandle,
    state::JobTable,
    supervisor::Role,
};

pub struct Reaper {
    backend: BackendRef,
    handoff: mpsc::UnboundedReceiver<Job>,
    reaper_period: Duration,
    max_poll_failures: u32,
    pending: HashMap<JobId, Vec<Submission>>,
    next_poll: Option<Instant>,
    poll_failures: u32,
    handoff_closed: bool,
    table: JobTable,
    metrics: MetricsHandle,
}

impl Reaper {
    pub fn new(
        backend: BackendRef,
        handoff: mpsc::UnboundedReceiver<Job>,
        reaper_period: Duration,
        max_poll_failures: u32,
        table: JobTable,
        metrics: MetricsHandle,
    ) -> Self {
        Self {
            backend,
            handoff,
            reaper_period,
            max_poll_failures: max_poll_failures.max(1),
            pending: HashMap::new(),
            next_poll: None,
            poll_failures: 0,
            handoff_closed: false,
            table,
            metrics,
        }
    }

    /// Number of jobs being watched.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn register(&mut self, job: Job) {
        if self.pending.is_empty() {
            self.next_poll = Some(Instant::now() + self.reaper_period);
        }
        debug!(target: "jobpack.core.reaper", job = %job.id, tasks = job.tasks.len(), "watching job");
        self.pending.entry(job.id).or_default().extend(job.tasks);
        self.metrics.jobs_pending(self.backend.name(), self.pending.len());
    }

    /// Wait for the next event and handle it.
    ///
    /// Returns `false` once there is nothing left to do.
    async fn step(&mut self, cancel: &CancellationToken) -> bool {
        if self.pending.is_empty() {
            if self.handoff_closed {
                return false;
            }
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                job = self.handoff.recv() => job,
            };
            match job {
                Some(job) => self.register(job),
                None => self.handoff_closed = true,
            }
            return true;
        }

        let deadline = *self
            .next_poll
            .get_or_insert_with(|| Instant::now() + self.reaper_period);

        if self.handoff_closed {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = sleep_until(deadline) => self.reap().await,
            }
            return true;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            next = timeout_at(deadline, self.handoff.recv()) => match next {
                Ok(Some(job)) => self.register(job),
                Ok(None) => {
                    debug!(target: "jobpack.core.reaper", pending = self.pending.len(), "hand-off closed; draining");
                    self.handoff_closed = true;
                }
                Err(_elapsed) => self.reap().await,
            },
        }
        true
    }

    /// Poll the backend once and deliver every terminal status.
    async fn reap(&mut self) {
        let backend = self.backend.name();
        let ids: Vec<JobId> = self.pending.keys().cloned().collect();
        let result = self.backend.job_statuses(&ids).await;
        self.next_poll = Some(Instant::now() + self.reaper_period);

        match result {
            Ok(statuses) => {
                self.poll_failures = 0;
                for (id, code) in statuses {
                    let Some(tasks) = self.pending.remove(&id) else {
                        continue;
                    };
                    info!(target: "jobpack.core.reaper", backend, job = %id, tasks = tasks.len(), code = code.code(), "reaping job");
                    self.finish(&id, tasks, code);
                }
            }
            Err(e) => {
                self.poll_failures += 1;
                self.metrics.status_poll_failed(backend);
                warn!(
                    target: "jobpack.core.reaper",
                    backend,
                    error = %e,
                    failures = self.poll_failures,
                    limit = self.max_poll_failures,
                    "status query failed"
                );
                if self.poll_failures >= self.max_poll_failures {
                    error!(
                        target: "jobpack.core.reaper",
                        backend,
                        jobs = self.pending.len(),
                        "status queries keep failing; failing all pending jobs"
                    );
                    let pending: Vec<_> = self.pending.drain().collect();
                    for (id, tasks) in pending {
                        self.finish(&id, tasks, ExitCode::FAILURE);
                    }
                    self.poll_failures = 0;
                }
            }
        }
        self.metrics.jobs_pending(backend, self.pending.len());
    }

    fn finish(&self, id: &JobId, tasks: Vec<Submission>, code: ExitCode) {
        self.metrics.job_reaped(self.backend.name(), code, tasks.len());
        deliver_all(id.as_str(), tasks, code);
        self.table.remove(id);
        self.backend.forget(id);
    }
}

#[async_trait]
impl Role for Reaper {
    fn name(&self) -> &'static str {
        "reaper"
    }

    async fn run(&mut self, cancel: &CancellationToken) -> Result<(), CoreError> {
        while self.step(cancel).await {}
        if !self.pending.is_empty() {
            warn!(target: "jobpack.core.reaper", jobs = self.pending.len(), "stopping with jobs still in flight");
        }
        Ok(())
    }
}
