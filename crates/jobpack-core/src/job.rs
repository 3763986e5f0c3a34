use jobpack_model::{ExitCode, JobId, Task};
use tokio::sync::oneshot;
use tracing::trace;

/// A task together with the one-shot slot its submitter waits on.
#[derive(Debug)]
pub struct Submission {
    pub task: Task,
    reply: oneshot::Sender<ExitCode>,
}

impl Submission {
    /// Create a submission and the receiver its submitter blocks on.
    pub fn new(task: Task) -> (Self, oneshot::Receiver<ExitCode>) {
        let (reply, rx) = oneshot::channel();
        (Self { task, reply }, rx)
    }

    /// Write the result slot. Consumes the submission, so a slot is written at most once.
    ///
    /// Returns `false` if the submitter has gone away.
    pub fn deliver(self, code: ExitCode) -> bool {
        self.reply.send(code).is_ok()
    }
}

/// A batch that the backend accepted as one job.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub tasks: Vec<Submission>,
}

impl Job {
    pub fn new(id: JobId, tasks: Vec<Submission>) -> Self {
        Self { id, tasks }
    }

    /// Deliver `code` to every task of the job; returns how many submitters were still waiting.
    pub fn deliver(self, code: ExitCode) -> usize {
        deliver_all(&self.id.to_string(), self.tasks, code)
    }
}

pub(crate) fn deliver_all(label: &str, tasks: Vec<Submission>, code: ExitCode) -> usize {
    let mut delivered = 0;
    for submission in tasks {
        if submission.deliver(code) {
            delivered += 1;
        } else {
            trace!(target: "jobpack.core.job", job = label, "submitter went away before delivery");
        }
    }
    delivered
}
