//! In-memory backend for tests.

use std::{
    collections::HashMap,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use jobpack_model::{ExitCode, JobId};

use crate::{
    backend::{Backend, Timings},
    error::BackendError,
};

/// Backend that records every call and reports whatever statuses the test sets.
///
/// Job ids are `job-1`, `job-2`, ... in submission order.
pub struct FakeBackend {
    job_size: usize,
    timings: Timings,
    next_id: AtomicU64,
    reject: AtomicBool,
    report_all: AtomicBool,
    failing_polls: AtomicU32,
    batches: Mutex<Vec<Vec<String>>>,
    polls: Mutex<Vec<Vec<JobId>>>,
    statuses: Mutex<HashMap<JobId, ExitCode>>,
    forgotten: Mutex<Vec<JobId>>,
}

impl FakeBackend {
    pub fn new(job_size: usize) -> Self {
        Self {
            job_size,
            timings: Timings::new(Duration::from_secs(3), Duration::from_millis(200)),
            next_id: AtomicU64::new(1),
            reject: AtomicBool::new(false),
            report_all: AtomicBool::new(false),
            failing_polls: AtomicU32::new(0),
            batches: Mutex::default(),
            polls: Mutex::default(),
            statuses: Mutex::default(),
            forgotten: Mutex::default(),
        }
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Make `schedule_tasks` fail until switched off again.
    pub fn reject_submissions(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Report every terminal job on each poll, including ids that were not asked for.
    pub fn report_all_statuses(&self, all: bool) {
        self.report_all.store(all, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `job_statuses` fail.
    pub fn fail_polls(&self, n: u32) {
        self.failing_polls.store(n, Ordering::SeqCst);
    }

    /// Mark a job terminal with `code`.
    pub fn complete(&self, id: &JobId, code: ExitCode) {
        lock(&self.statuses).insert(id.clone(), code);
    }

    /// Command lines of every accepted batch, in submission order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        lock(&self.batches).clone()
    }

    /// Id sets passed to every `job_statuses` call, including failed ones.
    pub fn polls(&self) -> Vec<Vec<JobId>> {
        lock(&self.polls).clone()
    }

    pub fn forgotten(&self) -> Vec<JobId> {
        lock(&self.forgotten).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn optimal_job_size(&self) -> usize {
        self.job_size
    }

    fn timings(&self) -> Timings {
        self.timings
    }

    async fn schedule_tasks(&self, command_lines: &[String]) -> Result<JobId, BackendError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected {
                program: "fake".to_string(),
                code: Some(1),
                stderr: "submission rejected".to_string(),
            });
        }
        lock(&self.batches).push(command_lines.to_vec());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(JobId::from(format!("job-{n}")))
    }

    async fn job_statuses(
        &self,
        job_ids: &[JobId],
    ) -> Result<HashMap<JobId, ExitCode>, BackendError> {
        let mut ids = job_ids.to_vec();
        ids.sort();
        lock(&self.polls).push(ids);

        let failing = self.failing_polls.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_polls.store(failing - 1, Ordering::SeqCst);
            return Err(BackendError::Rejected {
                program: "fake".to_string(),
                code: Some(1),
                stderr: "accounting unavailable".to_string(),
            });
        }

        let statuses = lock(&self.statuses);
        if self.report_all.load(Ordering::SeqCst) {
            return Ok(statuses.clone());
        }
        Ok(job_ids
            .iter()
            .filter_map(|id| statuses.get(id).map(|code| (id.clone(), *code)))
            .collect())
    }

    fn forget(&self, job_id: &JobId) {
        lock(&self.forgotten).push(job_id.clone());
    }
}
