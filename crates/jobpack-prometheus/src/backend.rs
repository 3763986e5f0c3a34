use jobpack_core::MetricsBackend;
use jobpack_model::ExitCode;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    batches_submitted: IntCounterVec,
    batches_failed: IntCounterVec,
    batch_size: HistogramVec,
    tasks_completed: IntCounterVec,
    poll_failures: IntCounterVec,
    jobs_pending: IntGaugeVec,
}

impl PrometheusMetrics {
    /// Create the collectors on a fresh registry.
    pub fn new() -> prometheus::Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create the collectors and register them on `registry`.
    pub fn with_registry(registry: Registry) -> prometheus::Result<Self> {
        let batches_submitted = IntCounterVec::new(
            Opts::new(
                "jobpack_batches_submitted_total",
                "Batches accepted by the backend",
            ),
            &["backend"],
        )?;
        let batches_failed = IntCounterVec::new(
            Opts::new(
                "jobpack_batches_failed_total",
                "Batches the backend rejected",
            ),
            &["backend"],
        )?;
        let batch_size = HistogramVec::new(
            HistogramOpts::new("jobpack_batch_size", "Tasks per submitted batch")
                .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0]),
            &["backend"],
        )?;
        let tasks_completed = IntCounterVec::new(
            Opts::new(
                "jobpack_tasks_completed_total",
                "Tasks released with a result",
            ),
            &["backend", "outcome"],
        )?;
        let poll_failures = IntCounterVec::new(
            Opts::new(
                "jobpack_status_poll_failures_total",
                "Failed job status queries",
            ),
            &["backend"],
        )?;
        let jobs_pending = IntGaugeVec::new(
            Opts::new("jobpack_jobs_pending", "Jobs waiting to be reaped"),
            &["backend"],
        )?;

        registry.register(Box::new(batches_submitted.clone()))?;
        registry.register(Box::new(batches_failed.clone()))?;
        registry.register(Box::new(batch_size.clone()))?;
        registry.register(Box::new(tasks_completed.clone()))?;
        registry.register(Box::new(poll_failures.clone()))?;
        registry.register(Box::new(jobs_pending.clone()))?;

        Ok(Self {
            registry,
            batches_submitted,
            batches_failed,
            batch_size,
            tasks_completed,
            poll_failures,
            jobs_pending,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Current metrics in the Prometheus text exposition format.
    pub fn encode_text(&self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn outcome(code: ExitCode) -> &'static str {
    if code.is_success() { "success" } else { "failure" }
}

impl MetricsBackend for PrometheusMetrics {
    fn batch_submitted(&self, backend: &str, tasks: usize) {
        self.batches_submitted.with_label_values(&[backend]).inc();
        self.batch_size
            .with_label_values(&[backend])
            .observe(tasks as f64);
    }

    fn batch_failed(&self, backend: &str, tasks: usize) {
        self.batches_failed.with_label_values(&[backend]).inc();
        self.tasks_completed
            .with_label_values(&[backend, "rejected"])
            .inc_by(tasks as u64);
    }

    fn job_reaped(&self, backend: &str, code: ExitCode, tasks: usize) {
        self.tasks_completed
            .with_label_values(&[backend, outcome(code)])
            .inc_by(tasks as u64);
    }

    fn status_poll_failed(&self, backend: &str) {
        self.poll_failures.with_label_values(&[backend]).inc();
    }

    fn jobs_pending(&self, backend: &str, count: usize) {
        self.jobs_pending
            .with_label_values(&[backend])
            .set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_batches_and_outcomes() {
        let m = PrometheusMetrics::new().unwrap();
        m.batch_submitted("slurm", 32);
        m.batch_submitted("slurm", 3);
        m.job_reaped("slurm", ExitCode::SUCCESS, 32);
        m.job_reaped("slurm", ExitCode(1), 3);
        m.batch_failed("slurm", 2);

        assert_eq!(m.batches_submitted.with_label_values(&["slurm"]).get(), 2);
        assert_eq!(m.batches_failed.with_label_values(&["slurm"]).get(), 1);
        assert_eq!(
            m.tasks_completed.with_label_values(&["slurm", "success"]).get(),
            32
        );
        assert_eq!(
            m.tasks_completed.with_label_values(&["slurm", "failure"]).get(),
            3
        );
        assert_eq!(
            m.tasks_completed.with_label_values(&["slurm", "rejected"]).get(),
            2
        );
        assert_eq!(
            m.batch_size.with_label_values(&["slurm"]).get_sample_count(),
            2
        );
    }

    #[test]
    fn pending_gauge_tracks_latest_value() {
        let m = PrometheusMetrics::new().unwrap();
        m.jobs_pending("parallel", 4);
        m.jobs_pending("parallel", 1);
        assert_eq!(m.jobs_pending.with_label_values(&["parallel"]).get(), 1);
    }

    #[test]
    fn text_exposition_names_every_touched_family() {
        let m = PrometheusMetrics::new().unwrap();
        m.batch_submitted("parallel", 4);
        m.status_poll_failed("parallel");

        let text = m.encode_text().unwrap();
        assert!(text.contains("jobpack_batches_submitted_total{backend=\"parallel\"} 1"));
        assert!(text.contains("jobpack_status_poll_failures_total{backend=\"parallel\"} 1"));
        assert!(text.contains("jobpack_batch_size_bucket"));
    }

    #[test]
    fn registering_twice_on_one_registry_fails() {
        let registry = Registry::new();
        assert!(PrometheusMetrics::with_registry(registry.clone()).is_ok());
        assert!(PrometheusMetrics::with_registry(registry).is_err());
    }
}
