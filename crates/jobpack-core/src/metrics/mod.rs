use std::sync::Arc;

use jobpack_model::ExitCode;

/// Metrics sink for the batching and reaping loops.
///
/// Every method has a no-op default so sinks implement only what they record.
pub trait MetricsBackend: Send + Sync + 'static {
    /// A batch of `tasks` was accepted by the backend.
    fn batch_submitted(&self, _backend: &str, _tasks: usize) {}

    /// The backend rejected a batch of `tasks`.
    fn batch_failed(&self, _backend: &str, _tasks: usize) {}

    /// A job holding `tasks` reached a terminal state with `code`.
    fn job_reaped(&self, _backend: &str, _code: ExitCode, _tasks: usize) {}

    /// A status query to the backend failed.
    fn status_poll_failed(&self, _backend: &str) {}

    /// Number of jobs the reaper is watching.
    fn jobs_pending(&self, _backend: &str, _count: usize) {}
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsBackend for NoopMetrics {}

impl NoopMetrics {
    pub fn handle() -> MetricsHandle {
        Arc::new(NoopMetrics)
    }
}
