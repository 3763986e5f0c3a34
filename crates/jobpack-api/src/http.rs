use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use jobpack_model::{JobInfo, SubmitResponse, Task};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::ApiError, handler::ApiHandler};

/// HTTP gateway builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - POST / - Submit task (path used by the `send-task` client)
    /// - POST /api/v1/tasks - Submit task
    /// - GET /api/v1/jobs - List in-flight jobs
    /// - GET /api/v1/health - Loop health, 503 unless every loop runs
    pub fn router(self) -> Router {
        Router::new()
            .route("/", post(submit_task::<H>))
            .route("/api/v1/tasks", post(submit_task::<H>))
            .route("/api/v1/jobs", get(list_jobs::<H>))
            .route("/api/v1/health", get(health::<H>))
            .with_state(self.handler)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ListJobsResponse {
    jobs: Vec<JobInfo>,
    total: usize,
}

/// POST / and POST /api/v1/tasks
///
/// Holds the connection until the task's job is reaped.
async fn submit_task<H>(
    State(handler): State<Arc<H>>,
    Json(task): Json<Task>,
) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    debug!(argv = ?task.argv, cwd = %task.cwd.display(), "submitting task");
    let rc = handler.submit_task(task).await?;
    Ok(Json(SubmitResponse { rc }))
}

/// GET /api/v1/jobs
async fn list_jobs<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let jobs = handler.list_jobs().await?;
    let total = jobs.len();
    Ok(Json(ListJobsResponse { jobs, total }))
}

/// GET /api/v1/health
async fn health<H>(State(handler): State<Arc<H>>) -> Result<impl IntoResponse, ApiError>
where
    H: ApiHandler,
{
    let report = handler.health().await?;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(report)))
}
