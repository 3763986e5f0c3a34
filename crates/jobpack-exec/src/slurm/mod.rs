//! Slurm cluster backend.
//!
//! Each batch becomes one `sbatch` job. Command lines reach the job through a tasks file in the
//! submission directory; the generated script runs a step launcher over that file. Completion is
//! read from `sacct`.

mod sacct;
mod script;

pub use sacct::{parse_sacct_output, parse_sbatch_output};
pub use script::{ResourceShape, render_job_script};

use std::{
    collections::HashMap,
    io::{self, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use jobpack_core::{Backend, BackendError, Timings};
use jobpack_model::{ExitCode, JobId};
use tracing::{debug, info, warn};

use crate::util::{checked_stdout, cmd_program, render_task_list, run_captured};

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub account: String,
    pub partition: String,
    /// Nodes requested for a full batch.
    pub job_nodes: usize,
    pub jobs_per_gpu: usize,
    pub gpus_per_node: usize,
    /// Wall-clock limit in Slurm's `HH:MM:SS` form.
    pub time_limit: String,
    /// Per-step launcher handed the tasks file.
    pub step_script: String,
    /// Submission directory. Tasks files and job output land here.
    pub workdir: PathBuf,
    pub sbatch: PathBuf,
    pub sacct: PathBuf,
    pub timings: Timings,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            account: "laionize".to_string(),
            partition: "booster".to_string(),
            job_nodes: 4,
            jobs_per_gpu: 2,
            gpus_per_node: 4,
            time_limit: "00:20:00".to_string(),
            step_script: "~/slurm-scripts/one-slurm-batch-job.sh".to_string(),
            workdir: PathBuf::from("."),
            sbatch: PathBuf::from("sbatch"),
            sacct: PathBuf::from("sacct"),
            timings: Timings::new(Duration::from_secs(30), Duration::from_secs(5)),
        }
    }
}

pub struct ClusterBackend {
    cfg: ClusterConfig,
}

impl ClusterBackend {
    pub fn new(cfg: ClusterConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.cfg
    }
}

/// Write `contents` to a fresh `tasks.*` file in `dir`. The file is kept on disk.
fn write_task_list(dir: &Path, contents: &str) -> io::Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("tasks.")
        .tempfile_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    let (_, path) = file.keep().map_err(|e| e.error)?;
    Ok(path)
}

async fn store_task_list(dir: &Path, contents: String) -> io::Result<PathBuf> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || write_task_list(&dir, &contents))
        .await
        .map_err(io::Error::other)?
}

/// Link `tasks.<id>` to the tasks file so it can be found by job id.
async fn link_task_list(dir: &Path, task_list: &Path, id: &JobId) -> io::Result<()> {
    let target = task_list.file_name().map(Path::new).unwrap_or(task_list);
    let link = dir.join(format!("tasks.{id}"));
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            tokio::fs::symlink(target, link).await
        } else {
            tokio::fs::copy(task_list, link).await.map(|_| ())
        }
    }
}

#[async_trait]
impl Backend for ClusterBackend {
    fn name(&self) -> &'static str {
        "slurm"
    }

    fn optimal_job_size(&self) -> usize {
        self.cfg.optimal_job_size()
    }

    fn timings(&self) -> Timings {
        self.cfg.timings
    }

    async fn schedule_tasks(&self, command_lines: &[String]) -> Result<JobId, BackendError> {
        let shape = self.cfg.optimal_config(command_lines.len());
        let contents = render_task_list(command_lines)?;
        let task_list = store_task_list(&self.cfg.workdir, contents).await?;
        let list_name = task_list
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let script = render_job_script(&self.cfg, shape, &list_name);
        debug!(
            target: "jobpack.exec.slurm",
            tasks = command_lines.len(),
            nodes = shape.nodes,
            tasks_per_gpu = shape.tasks_per_gpu,
            task_list = %task_list.display(),
            "submitting job"
        );

        let mut cmd = cmd_program(&self.cfg.sbatch, ["--parsable", "/dev/stdin"]);
        cmd.current_dir(&self.cfg.workdir);
        let program = self.cfg.sbatch.display().to_string();

        let stdout = match run_captured(cmd, script.as_bytes())
            .await
            .and_then(|out| checked_stdout(&program, out))
        {
            Ok(stdout) => stdout,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&task_list).await {
                    warn!(target: "jobpack.exec.slurm", error = %rm, "could not remove tasks file");
                }
                return Err(e);
            }
        };
        let id = parse_sbatch_output(&program, &stdout)?;

        if let Err(e) = link_task_list(&self.cfg.workdir, &task_list, &id).await {
            warn!(target: "jobpack.exec.slurm", job = %id, error = %e, "could not link tasks file");
        }
        info!(target: "jobpack.exec.slurm", job = %id, tasks = command_lines.len(), "job submitted");
        Ok(id)
    }

    async fn job_statuses(
        &self,
        job_ids: &[JobId],
    ) -> Result<HashMap<JobId, ExitCode>, BackendError> {
        if job_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = job_ids
            .iter()
            .map(JobId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let cmd = cmd_program(
            &self.cfg.sacct,
            ["-j", ids.as_str(), "-o", "jobid,state", "-n", "-P"],
        );
        let program = self.cfg.sacct.display().to_string();

        let stdout = checked_stdout(&program, run_captured(cmd, &[]).await?)?;
        let statuses = parse_sacct_output(job_ids, &stdout);
        debug!(target: "jobpack.exec.slurm", queried = job_ids.len(), terminal = statuses.len(), "polled accounting");
        Ok(statuses)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt};

    use super::*;

    fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn backend(dir: &Path, sbatch: &str, sacct: &str) -> ClusterBackend {
        ClusterBackend::new(ClusterConfig {
            workdir: dir.to_path_buf(),
            sbatch: fake_tool(dir, "fake-sbatch", sbatch),
            sacct: fake_tool(dir, "fake-sacct", sacct),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn task_list_has_one_line_per_task() {
        let dir = tempfile::tempdir().unwrap();
        let contents = render_task_list(&["echo a".into(), "echo b".into()]).unwrap();
        let path = store_task_list(dir.path(), contents).await.unwrap();

        assert!(path.file_name().unwrap().to_string_lossy().starts_with("tasks."));
        assert_eq!(fs::read_to_string(&path).unwrap(), "echo a\necho b\n");
    }

    #[tokio::test]
    async fn submits_script_on_stdin_and_links_tasks_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(
            dir.path(),
            r#"echo "$@" > sbatch.args; cat > submitted.sh; echo "4242;booster""#,
            "true",
        );

        let id = backend
            .schedule_tasks(&["echo one".into(), "echo two".into()])
            .await
            .unwrap();
        assert_eq!(id, JobId::from("4242"));

        let args = fs::read_to_string(dir.path().join("sbatch.args")).unwrap();
        assert_eq!(args.trim(), "--parsable /dev/stdin");

        let script = fs::read_to_string(dir.path().join("submitted.sh")).unwrap();
        assert!(script.contains("#SBATCH --nodes=1\n"));
        assert!(script.contains("#SBATCH --ntasks-per-gpu=1\n"));

        let tasks = fs::read_to_string(dir.path().join("tasks.4242")).unwrap();
        assert_eq!(tasks, "echo one\necho two\n");
    }

    #[tokio::test]
    async fn rejected_submission_reports_stderr_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(
            dir.path(),
            "cat > /dev/null; echo 'sbatch: error: invalid partition' >&2; exit 1",
            "true",
        );

        let err = backend.schedule_tasks(&["true".into()]).await.unwrap_err();
        match err {
            BackendError::Rejected { code, stderr, .. } => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("invalid partition"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("tasks."))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn multi_line_command_is_refused_before_submission() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path(), "cat > submitted.sh; echo 1", "true");

        let err = backend
            .schedule_tasks(&["true".into(), "sh -c 'echo a\necho b'".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MultiLineCommand { index: 1 }));
        assert!(!dir.path().join("submitted.sh").exists());

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("tasks."))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn statuses_come_from_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(
            dir.path(),
            "true",
            r#"echo "$@" > "$(dirname "$0")/sacct.args"
printf '10|COMPLETED\n10.batch|COMPLETED\n11|RUNNING\n12|TIMEOUT\n'"#,
        );

        let ids = [JobId::from("10"), JobId::from("11"), JobId::from("12")];
        let statuses = backend.job_statuses(&ids).await.unwrap();

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[&ids[0]], ExitCode::SUCCESS);
        assert_eq!(statuses[&ids[2]], ExitCode::FAILURE);

        let args = fs::read_to_string(dir.path().join("sacct.args")).unwrap();
        assert_eq!(args.trim(), "-j 10,11,12 -o jobid,state -n -P");

        // repeat-safe
        assert_eq!(backend.job_statuses(&ids).await.unwrap(), statuses);
    }

    #[tokio::test]
    async fn empty_poll_skips_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path(), "true", "exit 1");
        assert!(backend.job_statuses(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_accounting_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path(), "true", "echo 'slurmdbd unreachable' >&2; exit 1");
        let err = backend.job_statuses(&[JobId::from("1")]).await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected { .. }));
    }
}
