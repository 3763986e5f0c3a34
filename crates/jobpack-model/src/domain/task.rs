use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::TaskEnv;

/// One submitted unit of work: a command line plus the context it was invoked in.
///
/// The JSON shape is `{"argv": [...], "cwd": "...", "env": {...}}`.
/// `cwd` and `env` may be omitted by clients that do not capture them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Argument vector, program first.
    pub argv: Vec<String>,
    /// Working directory of the submitter.
    #[serde(default)]
    pub cwd: PathBuf,
    /// Full environment of the submitter.
    #[serde(default)]
    pub env: TaskEnv,
}

impl Task {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_env(mut self, env: TaskEnv) -> Self {
        self.env = env;
        self
    }

    /// Argument vector joined by single spaces.
    ///
    /// Quoting is not preserved: `["sh", "-c", "a b"]` becomes `sh -c a b`.
    pub fn joined(&self) -> String {
        self.argv.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_argv_only_payload() {
        let task: Task = serde_json::from_str(r#"{"argv": ["-c", "echo hi"]}"#).unwrap();
        assert_eq!(task.argv, vec!["-c", "echo hi"]);
        assert_eq!(task.cwd, PathBuf::new());
        assert!(task.env.is_empty());
    }

    #[test]
    fn decodes_full_payload() {
        let raw = r#"{"argv": ["make", "all"], "cwd": "/src", "env": {"CC": "clang"}}"#;
        let task: Task = serde_json::from_str(raw).unwrap();

        assert_eq!(task.cwd, PathBuf::from("/src"));
        assert_eq!(task.env.get("CC"), Some("clang"));
        assert_eq!(task.joined(), "make all");
    }

    #[test]
    fn joined_loses_argument_boundaries() {
        let task = Task::new(["sh", "-c", "echo a b"]);
        assert_eq!(task.joined(), "sh -c echo a b");
    }
}
