use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::JobId;

/// Snapshot of an in-flight job as shown by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    /// Number of tasks batched into the job.
    pub tasks: usize,
    /// Backend that runs the job.
    pub backend: String,
    pub submitted_at: SystemTime,
}
