//! Local backend driving GNU `parallel`.
//!
//! Each batch spawns one `parallel {}` process with the batch's command lines on stdin. The
//! process exit code is the job's exit code; `parallel` exits with the number of failed tasks.

use std::{
    collections::HashMap,
    path::PathBuf,
    process::Stdio,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use jobpack_core::{Backend, BackendError, Timings};
use jobpack_model::{ExitCode, JobId};
use tokio::{io::AsyncWriteExt, process::Child};
use tracing::{debug, info, trace, warn};

use crate::util::{cmd_program, exit_code, render_task_list};

#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub job_size: usize,
    pub timings: Timings,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("parallel"),
            args: vec!["{}".to_string()],
            job_size: 4,
            timings: Timings::new(Duration::from_secs(3), Duration::from_millis(200)),
        }
    }
}

enum LocalJob {
    Running(Child),
    Exited(ExitCode),
}

pub struct LocalParallelBackend {
    cfg: LocalConfig,
    next_id: AtomicU64,
    jobs: Mutex<HashMap<JobId, LocalJob>>,
}

impl LocalParallelBackend {
    pub fn new(cfg: LocalConfig) -> Self {
        Self {
            cfg,
            next_id: AtomicU64::new(1),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, LocalJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Backend for LocalParallelBackend {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn optimal_job_size(&self) -> usize {
        self.cfg.job_size
    }

    fn timings(&self) -> Timings {
        self.cfg.timings
    }

    async fn schedule_tasks(&self, command_lines: &[String]) -> Result<JobId, BackendError> {
        let payload = render_task_list(command_lines)?;
        let mut cmd = cmd_program(&self.cfg.program, &self.cfg.args);
        cmd.stdin(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| BackendError::Spawn {
            program: self.cfg.program.display().to_string(),
            source,
        })?;
        let id = JobId::from(format!(
            "local-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));

        if let Some(mut stdin) = child.stdin.take() {
            // A runner that exits early closes its end; its exit code still reports the job.
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                warn!(target: "jobpack.exec.parallel", job = %id, error = %e, "runner stopped reading tasks");
            }
        }

        info!(target: "jobpack.exec.parallel", job = %id, pid = child.id(), tasks = command_lines.len(), "runner started");
        self.jobs().insert(id.clone(), LocalJob::Running(child));
        Ok(id)
    }

    async fn job_statuses(
        &self,
        job_ids: &[JobId],
    ) -> Result<HashMap<JobId, ExitCode>, BackendError> {
        let mut jobs = self.jobs();
        let mut statuses = HashMap::new();

        for id in job_ids {
            let Some(job) = jobs.get_mut(id) else {
                trace!(target: "jobpack.exec.parallel", job = %id, "unknown job");
                continue;
            };
            if let LocalJob::Running(child) = job {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        let code = exit_code(status);
                        debug!(target: "jobpack.exec.parallel", job = %id, code = code.code(), "runner exited");
                        *job = LocalJob::Exited(code);
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(target: "jobpack.exec.parallel", job = %id, error = %e, "could not check runner");
                        continue;
                    }
                }
            }
            if let LocalJob::Exited(code) = job {
                statuses.insert(id.clone(), *code);
            }
        }
        Ok(statuses)
    }

    fn forget(&self, job_id: &JobId) {
        self.jobs().remove(job_id);
    }
}
