//! Batching, dispatch and reaping engine.
//!
//! Individually submitted [`Task`](jobpack_model::Task)s are grouped by the [`batcher`] into batches,
//! each batch is handed to a [`Backend`] as a single job, and the [`reaper`] polls the backend
//! until the job is terminal and fans the job's exit code out to every submitter.
//!
//! [`TaskManager`] wires the two loops together, supervises them and is the single entry point used by the gateway.

pub mod backend;
pub use backend::{Backend, BackendRef, Timings};

pub mod batcher;
pub use batcher::{Batcher, CommandEncoding};

pub mod error;
pub use error::{BackendError, CoreError};

pub mod manager;
pub use manager::{ManagerConfig, TaskManager};

pub mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoopMetrics};

pub mod reaper;
pub use reaper::Reaper;

pub mod state;
pub use state::JobTable;

pub mod supervisor;
pub use supervisor::{RestartPolicy, Role, RoleState, Supervised};

mod job;
pub use job::{Job, Submission};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
