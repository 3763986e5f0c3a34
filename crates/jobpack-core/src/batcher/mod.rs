//! Size-or-linger batching.
//!
//! The batcher blocks for the first task of a batch, then keeps collecting until the batch holds
//! `job_size` tasks or no task arrived within `queue_delay` of the previous one. The batch is
//! submitted to the backend as one job and handed to the reaper.

mod encoding;
pub use encoding::CommandEncoding;

use std::time::Duration;

use async_trait::async_trait;
use jobpack_model::ExitCode;
use tokio::{
    sync::mpsc,
    time::{Instant, timeout_at},
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

pub struct Batcher {
    backend: BackendRef,
    inbound: mpsc::UnboundedReceiver<Submission>,
    handoff: mpsc::UnboundedSender<Job>,
    job_size: usize,
    queue_delay: Duration,
    encoding: CommandEncoding,
    table: JobTable,
    metrics: MetricsHandle,
}

impl Batcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: BackendRef,
        inbound: mpsc::UnboundedReceiver<Submission>,
        handoff: mpsc::UnboundedSender<Job>,
        job_size: usize,
        queue_delay: Duration,
        encoding: CommandEncoding,
        table: JobTable,
        metrics: MetricsHandle,
    ) -> Self {
        Self {
            backend,
            inbound,
            handoff,
            job_size: job_size.max(1),
            queue_delay,
            encoding,
            table,
            metrics,
        }
    }

    /// Collect the next batch.
    ///
    /// Returns `None` when cancelled or when the inbound queue is closed and empty.
    async fn collect(&mut self, cancel: &CancellationToken) -> Option<Vec<Submission>> {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            next = self.inbound.recv() => next?,
        };

        let mut batch = Vec::with_capacity(self.job_size);
        batch.push(first);
        let mut deadline = Instant::now() + self.queue_delay;

        while batch.len() < self.job_size {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(target: "jobpack.core.batcher", tasks = batch.len(), "cancelled while collecting; dropping partial batch");
                    return None;
                }
                next = timeout_at(deadline, self.inbound.recv()) => match next {
                    Ok(Some(submission)) => {
                        batch.push(submission);
                        deadline = Instant::now() + self.queue_delay;
                    }
                    // Inbound closed: flush what we have.
                    Ok(None) => break,
                    Err(_elapsed) => break,
                },
            }
        }
        Some(batch)
    }

    /// Submit one batch and hand the resulting job to the reaper.
    ///
    /// A rejected submission fails only this batch: every task in it gets [`ExitCode::FAILURE`].
    async fn dispatch(&mut self, batch: Vec<Submission>) -> Result<(), CoreError> {
        let backend = self.backend.name();
        let lines: Vec<String> = batch
            .iter()
            .map(|s| self.encoding.render(&s.task))
            .collect();
        debug!(target: "jobpack.core.batcher", backend, tasks = lines.len(), "scheduling batch");

        let id = match self.backend.schedule_tasks(&lines).await {
            Ok(id) => id,
            Err(e) => {
                error!(target: "jobpack.core.batcher", backend, tasks = batch.len(), error = %e, "backend rejected batch");
                self.metrics.batch_failed(backend, batch.len());
                deliver_all("<rejected>", batch, ExitCode::FAILURE);
                return Ok(());
            }
        };

        info!(target: "jobpack.core.batcher", backend, job = %id, tasks = batch.len(), "scheduled batch");
        self.metrics.batch_submitted(backend, batch.len());
        self.table.insert(&id, batch.len(), backend);

        if let Err(mpsc::error::SendError(job)) = self.handoff.send(Job::new(id, batch)) {
            self.table.remove(&job.id);
            job.deliver(ExitCode::FAILURE);
            return Err(CoreError::HandoffClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl Role for Batcher {
    fn name(&self) -> &'static str {
        "batcher"
    }

    async fn run(&mut self, cancel: &CancellationToken) -> Result<(), CoreError> {
        while let Some(batch) = self.collect(cancel).await {
            self.dispatch(batch).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use jobpack_model::Task;

    use super::*;
    use crate::{metrics::NoopMetrics, testing::FakeBackend};

    struct Rig {
        backend: Arc<FakeBackend>,
        inbound: mpsc::UnboundedSender<Submission>,
        handoff: mpsc::UnboundedReceiver<Job>,
        batcher: Batcher,
    }

    fn rig(job_size: usize, queue_delay: Duration) -> Rig {
        let backend = Arc::new(FakeBackend::new(job_size));
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let batcher = Batcher::new(
            backend.clone(),
            in_rx,
            job_tx,
            job_size,
            queue_delay,
            CommandEncoding::Joined,
            JobTable::new(),
            NoopMetrics::handle(),
        );
        Rig {
            backend,
            inbound: in_tx,
            handoff: job_rx,
            batcher,
        }
    }

    fn submit(tx: &mpsc::UnboundedSender<Submission>, argv: &[&str]) -> tokio::sync::oneshot::Receiver<ExitCode> {
        let (submission, rx) = Submission::new(Task::new(argv.iter().copied()));
        tx.send(submission).unwrap();
        rx
    }

    fn assert_near(elapsed: Duration, expected: Duration) {
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "elapsed {elapsed:?}, expected about {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn full_batch_is_cut_without_waiting() {
        let mut rig = rig(4, Duration::from_secs(3));
        for i in 0..5 {
            let n = i.to_string();
            submit(&rig.inbound, &["echo", n.as_str()]);
        }

        let start = Instant::now();
        let batch = rig.batcher.collect(&CancellationToken::new()).await.unwrap();

        assert_eq!(batch.len(), 4);
        assert_eq!(start.elapsed(), Duration::ZERO);
        let argv: Vec<_> = batch.iter().map(|s| s.task.joined()).collect();
        assert_eq!(argv, vec!["echo 0", "echo 1", "echo 2", "echo 3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn lone_task_is_cut_after_linger_window() {
        let mut rig = rig(4, Duration::from_secs(3));
        submit(&rig.inbound, &["true"]);

        let start = Instant::now();
        let batch = rig.batcher.collect(&CancellationToken::new()).await.unwrap();

        assert_eq!(batch.len(), 1);
        assert_near(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn each_arrival_refreshes_the_deadline() {
        let mut rig = rig(4, Duration::from_secs(3));
        let tx = rig.inbound.clone();
        submit(&tx, &["a"]);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            submit(&tx, &["b"]);
        });

        let start = Instant::now();
        let batch = rig.batcher.collect(&CancellationToken::new()).await.unwrap();

        assert_eq!(batch.len(), 2);
        assert_near(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_inbound_flushes_partial_batch() {
        let mut rig = rig(4, Duration::from_secs(30));
        submit(&rig.inbound, &["a"]);
        submit(&rig.inbound, &["b"]);
        drop(rig.inbound);

        let cancel = CancellationToken::new();
        let batch = rig.batcher.collect(&cancel).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(rig.batcher.collect(&cancel).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_hands_job_to_reaper() {
        let mut rig = rig(2, Duration::from_secs(1));
        submit(&rig.inbound, &["cc", "-c", "a.c"]);
        submit(&rig.inbound, &["cc", "-c", "b.c"]);

        let batch = rig.batcher.collect(&CancellationToken::new()).await.unwrap();
        rig.batcher.dispatch(batch).await.unwrap();

        let job = rig.handoff.recv().await.unwrap();
        assert_eq!(job.tasks.len(), 2);
        assert_eq!(
            rig.backend.batches(),
            vec![vec!["cc -c a.c".to_string(), "cc -c b.c".to_string()]]
        );
        assert!(rig.batcher.table.get(&job.id).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_batch_fails_its_tasks_and_loop_continues() {
        let mut rig = rig(1, Duration::from_secs(1));
        rig.backend.reject_submissions(true);
        let rx = submit(&rig.inbound, &["make"]);

        let batch = rig.batcher.collect(&CancellationToken::new()).await.unwrap();
        rig.batcher.dispatch(batch).await.unwrap();

        assert_eq!(rx.await.unwrap(), ExitCode::FAILURE);
        assert!(rig.handoff.try_recv().is_err());
        assert!(rig.batcher.table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_reaper_fails_the_batch() {
        let mut rig = rig(1, Duration::from_secs(1));
        drop(rig.handoff);
        let rx = submit(&rig.inbound, &["make"]);

        let batch = rig.batcher.collect(&CancellationToken::new()).await.unwrap();
        let err = rig.batcher.dispatch(batch).await.unwrap_err();

        assert!(matches!(err, CoreError::HandoffClosed));
        assert!(err.is_permanent());
        assert_eq!(rx.await.unwrap(), ExitCode::FAILURE);
        assert!(rig.batcher.table.is_empty());
    }
}
