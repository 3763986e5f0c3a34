use std::{
    ffi::OsStr,
    path::Path,
    process::{ExitStatus, Output, Stdio},
};

use jobpack_core::BackendError;
use jobpack_model::ExitCode;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::trace;

pub fn cmd_program<I, S>(program: &Path, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Newline-terminated task list, one command per line.
///
/// Runners split their input on line breaks, so a command holding one is refused.
pub fn render_task_list(command_lines: &[String]) -> Result<String, BackendError> {
    let mut out = String::with_capacity(command_lines.iter().map(|l| l.len() + 1).sum());
    for (index, line) in command_lines.iter().enumerate() {
        if line.contains(['\n', '\r']) {
            return Err(BackendError::MultiLineCommand { index });
        }
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}

/// Run `cmd` to completion, feeding it `input` on stdin and capturing stdout and stderr.
pub async fn run_captured(mut cmd: Command, input: &[u8]) -> Result<Output, BackendError> {
    let program = program_name(&cmd);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    trace!(target: "jobpack.exec", %program, "spawn");
    let mut child = cmd
        .spawn()
        .map_err(|source| BackendError::Spawn {
            program: program.clone(),
            source,
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input).await?;
        // dropping stdin closes the pipe
    }
    Ok(child.wait_with_output().await?)
}

/// Turn a captured output into its stdout, or a `Rejected` error carrying stderr.
pub fn checked_stdout(program: &str, output: Output) -> Result<String, BackendError> {
    if !output.status.success() {
        return Err(BackendError::Rejected {
            program: program.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn program_name(cmd: &Command) -> String {
    cmd.as_std().get_program().to_string_lossy().into_owned()
}

/// Exit code of a finished process; death by signal `n` maps to `128 + n`.
pub fn exit_code(status: ExitStatus) -> ExitCode {
    if let Some(code) = status.code() {
        return ExitCode(code);
    }
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::process::ExitStatusExt;
            status
                .signal()
                .map(|sig| ExitCode(128 + sig))
                .unwrap_or(ExitCode::FAILURE)
        } else {
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_list_terminates_every_line() {
        let list = render_task_list(&["echo a".into(), "echo 'b c'".into()]).unwrap();
        assert_eq!(list, "echo a\necho 'b c'\n");
        assert_eq!(render_task_list(&[]).unwrap(), "");
    }

    #[test]
    fn task_list_refuses_embedded_line_breaks() {
        let err = render_task_list(&["true".into(), "sh -c 'echo a\necho b'".into()]).unwrap_err();
        assert!(matches!(err, BackendError::MultiLineCommand { index: 1 }));
    }
}
