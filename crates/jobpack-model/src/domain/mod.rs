mod task;
pub use task::Task;

mod task_env;
pub use task_env::TaskEnv;

mod job_id;
pub use job_id::JobId;

mod exit_code;
pub use exit_code::ExitCode;

mod reply;
pub use reply::{ErrorResponse, SubmitResponse};

mod job_info;
pub use job_info::JobInfo;
