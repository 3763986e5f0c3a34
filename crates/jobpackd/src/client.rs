//! Submission client used as a build tool's shell: `SHELL=send-task make -j64`.
//!
//! The tool runs `send-task -c '<recipe>'`; everything after the flag is forwarded together with
//! the working directory and the full environment, and the process exits with the job's code.

use std::{env, ffi::OsString, io};

use jobpack_model::{ExitCode, SubmitResponse, Task, TaskEnv};
use thiserror::Error;
use tracing::debug;

pub const PORT_ENV: &str = "JOB_SCHEDULER_PORT";
pub const DEFAULT_PORT: u16 = 4444;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server replied {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable reply: {0}")]
    Decode(String),
}

impl ClientError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            ClientError::Transport(_) | ClientError::Status { .. } => 1,
            ClientError::Decode(_) => 2,
        }
    }
}

pub fn port_from_env() -> u16 {
    env::var(PORT_ENV)
        .ok()
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

pub fn endpoint(port: u16) -> String {
    format!("http://127.0.0.1:{port}/")
}

/// Build the task for an invocation `<program> <flag> <args>...`.
///
/// Variables whose name or value is not valid UTF-8 are left out.
pub fn task_from_invocation<I>(args: I) -> io::Result<Task>
where
    I: IntoIterator<Item = String>,
{
    let env: TaskEnv = env::vars_os()
        .filter_map(|(k, v): (OsString, OsString)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();
    Ok(Task::new(args.into_iter().skip(2))
        .with_cwd(env::current_dir()?)
        .with_env(env))
}

/// Post `task` to `url` and wait for its exit code.
///
/// There is no timeout: the reply arrives when the task's job has finished.
pub async fn submit(client: &reqwest::Client, url: &str, task: &Task) -> Result<ExitCode, ClientError> {
    debug!(%url, argv = ?task.argv, "submitting");
    let resp = client.post(url).json(task).send().await?;
    let status = resp.status();
    let body = resp.bytes().await?;

    if !status.is_success() {
        return Err(ClientError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    let reply: SubmitResponse =
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))?;
    Ok(reply.rc)
}
