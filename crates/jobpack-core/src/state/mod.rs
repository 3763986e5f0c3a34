use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::SystemTime,
};

use jobpack_model::{JobId, JobInfo};

/// In-memory view of in-flight jobs.
///
/// Written by the batcher (on submission) and the reaper (on reaping), read by the gateway.
/// The reaper's own pending table stays authoritative; this is for observation only.
#[derive(Clone, Default)]
pub struct JobTable {
    inner: Arc<RwLock<HashMap<JobId, JobInfo>>>,
}

impl JobTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly submitted job.
    pub fn insert(&self, id: &JobId, tasks: usize, backend: &str) {
        let info = JobInfo {
            id: id.clone(),
            tasks,
            backend: backend.to_string(),
            submitted_at: SystemTime::now(),
        };
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(id.clone(), info);
    }

    /// Drop a job (called once it is reaped).
    pub fn remove(&self, id: &JobId) -> Option<JobInfo> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.remove(id)
    }

    pub fn get(&self, id: &JobId) -> Option<JobInfo> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(id).cloned()
    }

    /// All in-flight jobs, oldest first.
    pub fn list(&self) -> Vec<JobInfo> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut jobs: Vec<JobInfo> = inner.values().cloned().collect();
        jobs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of tasks across in-flight jobs.
    pub fn pending_tasks(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.values().map(|info| info.tasks).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_job() {
        let table = JobTable::new();
        let id = JobId::from("9501614");

        table.insert(&id, 3, "slurm");

        let info = table.get(&id).expect("job should exist");
        assert_eq!(info.id, id);
        assert_eq!(info.tasks, 3);
        assert_eq!(info.backend, "slurm");
    }

    #[test]
    fn remove_job_deletes_it() {
        let table = JobTable::new();
        let id = JobId::from("local-1");

        table.insert(&id, 1, "parallel");
        assert!(table.remove(&id).is_some());
        assert!(table.get(&id).is_none());
        assert!(table.remove(&id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn counts_jobs_and_tasks() {
        let table = JobTable::new();
        table.insert(&JobId::from("a"), 4, "parallel");
        table.insert(&JobId::from("b"), 2, "parallel");

        assert_eq!(table.len(), 2);
        assert_eq!(table.pending_tasks(), 6);
        assert_eq!(table.list().len(), 2);
    }

    #[test]
    fn clones_share_state() {
        let table = JobTable::new();
        let view = table.clone();

        table.insert(&JobId::from("x"), 1, "slurm");
        assert_eq!(view.len(), 1);
    }
}
