use std::sync::Arc;

use async_trait::async_trait;
use jobpack_core::TaskManager;
use jobpack_model::{ExitCode, JobInfo, Task};

use crate::error::ApiError;
use crate::handler::{ApiHandler, HealthReport, RoleHealth};

/// Adapter that bridges [`TaskManager`] to [`ApiHandler`].
pub struct TaskManagerAdapter {
    manager: Arc<TaskManager>,
}

impl TaskManagerAdapter {
    pub fn new(manager: Arc<TaskManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ApiHandler for TaskManagerAdapter {
    async fn submit_task(&self, task: Task) -> Result<ExitCode, ApiError> {
        if task.argv.is_empty() {
            return Err(ApiError::InvalidRequest("argv cannot be empty".into()));
        }
        self.manager.submit(task).await.map_err(ApiError::from)
    }

    async fn list_jobs(&self) -> Result<Vec<JobInfo>, ApiError> {
        Ok(self.manager.jobs())
    }

    async fn health(&self) -> Result<HealthReport, ApiError> {
        let roles = self
            .manager
            .health()
            .into_iter()
            .map(|(name, state)| RoleHealth {
                name: name.to_string(),
                state: state.to_string(),
            })
            .collect();
        Ok(HealthReport {
            healthy: self.manager.is_healthy(),
            backend: self.manager.backend().to_string(),
            roles,
        })
    }
}
