use async_trait::async_trait;
use jobpack_model::{ExitCode, JobInfo, Task};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Submission gateway handler.
///
/// Lets the gateway run against the provided [`TaskManagerAdapter`](crate::TaskManagerAdapter)
/// or against a custom handler that adds its own checks.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Submit a task and wait for the exit code of the job it was batched into.
    async fn submit_task(&self, task: Task) -> Result<ExitCode, ApiError>;

    /// Jobs submitted to the backend and not reaped yet.
    async fn list_jobs(&self) -> Result<Vec<JobInfo>, ApiError>;

    async fn health(&self) -> Result<HealthReport, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `true` while every loop is running.
    pub healthy: bool,
    pub backend: String,
    pub roles: Vec<RoleHealth>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleHealth {
    pub name: String,
    pub state: String,
}
