use std::collections::{HashMap, HashSet};

use jobpack_core::BackendError;
use jobpack_model::{ExitCode, JobId};

/// Parse `sbatch --parsable` output (`<id>` or `<id>;<cluster>`).
pub fn parse_sbatch_output(program: &str, stdout: &str) -> Result<JobId, BackendError> {
    let id = stdout
        .trim()
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(BackendError::Parse {
            program: program.to_string(),
            output: stdout.to_string(),
        });
    }
    Ok(JobId::from(id))
}

/// Terminal statuses of `ids` in `sacct -o jobid,state -n -P` output.
///
/// Only lines whose job id matches one of `ids` exactly count, so step lines (`123.batch`,
/// `123.0`) and other array elements are ignored. `COMPLETED` maps to 0; `CANCELLED`, `TIMEOUT`
/// and `FAILED` map to 1. Jobs still queued or running are absent from the result.
pub fn parse_sacct_output(ids: &[JobId], stdout: &str) -> HashMap<JobId, ExitCode> {
    let wanted: HashSet<&str> = ids.iter().map(JobId::as_str).collect();
    let mut statuses = HashMap::new();

    for line in stdout.lines() {
        let Some((id, state)) = line.trim().split_once('|') else {
            continue;
        };
        if !wanted.contains(id) {
            continue;
        }
        // "CANCELLED by 1234"
        let state = state.split(['|', ' ']).next().unwrap_or_default();
        let code = match state {
            "COMPLETED" => ExitCode::SUCCESS,
            "CANCELLED" | "TIMEOUT" | "FAILED" => ExitCode::FAILURE,
            _ => continue,
        };
        statuses.insert(JobId::from(id), code);
    }
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
9501614|COMPLETED
9501614.batch|COMPLETED
9501614.0|COMPLETED
9544438|TIMEOUT
9544438.batch|CANCELLED
9544438.0|CANCELLED
9619422_0|TIMEOUT
9619422_0.batch|CANCELLED
9619422_0.0|FAILED
9622324_46|COMPLETED
9622324_46.batch|COMPLETED
9622324_46.0|COMPLETED
";

    fn ids(raw: &[&str]) -> Vec<JobId> {
        raw.iter().copied().map(JobId::from).collect()
    }

    #[test]
    fn sample_accounting_output() {
        let got = parse_sacct_output(&ids(&["9622442", "9619422", "9544438", "9501614"]), SAMPLE);

        let want: HashMap<_, _> = [
            (JobId::from("9501614"), ExitCode(0)),
            (JobId::from("9544438"), ExitCode(1)),
        ]
        .into_iter()
        .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn array_elements_need_exact_ids() {
        let got = parse_sacct_output(&ids(&["9619422_0", "9622324_46"]), SAMPLE);
        assert_eq!(got[&JobId::from("9619422_0")], ExitCode::FAILURE);
        assert_eq!(got[&JobId::from("9622324_46")], ExitCode::SUCCESS);
    }

    #[test]
    fn running_and_garbled_lines_are_ignored() {
        let out = "\n7|RUNNING\nnot a status line\n8|PENDING\n|COMPLETED\n9|\n";
        assert!(parse_sacct_output(&ids(&["7", "8", "9"]), out).is_empty());
    }

    #[test]
    fn cancelled_by_user_is_a_failure() {
        let got = parse_sacct_output(&ids(&["11"]), "11|CANCELLED by 4242\n");
        assert_eq!(got[&JobId::from("11")], ExitCode::FAILURE);
    }

    #[test]
    fn last_terminal_line_wins() {
        let got = parse_sacct_output(&ids(&["5"]), "5|COMPLETED\n5|FAILED\n");
        assert_eq!(got[&JobId::from("5")], ExitCode::FAILURE);
    }

    #[test]
    fn sbatch_output_with_cluster_suffix() {
        assert_eq!(parse_sbatch_output("sbatch", "9501614;booster\n").unwrap(), JobId::from("9501614"));
        assert_eq!(parse_sbatch_output("sbatch", "42\n").unwrap(), JobId::from("42"));
    }

    #[test]
    fn sbatch_output_without_id_is_an_error() {
        for out in ["", "\n", "sbatch: error: invalid account"] {
            assert!(matches!(
                parse_sbatch_output("sbatch", out),
                Err(BackendError::Parse { .. })
            ));
        }
    }
}
