use thiserror::Error;

/// Failures reported by a [`Backend`](crate::Backend) call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("spawn {program} failed: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{program} exited with {code:?}: {stderr}")]
    Rejected {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("command line {index} spans several lines")]
    MultiLineCommand { index: usize },

    #[error("unexpected output from {program}: {output:?}")]
    Parse { program: String, output: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("task manager is not accepting tasks")]
    Closed,

    #[error("task was dropped before its job was reaped")]
    Abandoned,

    #[error("reaper is gone; cannot hand off job")]
    HandoffClosed,

    #[error("task argument contains a line break; only the quoted encoding can submit it")]
    MultiLine,
}

impl CoreError {
    /// Errors no restart can recover from.
    pub fn is_permanent(&self) -> bool {
        matches!(self, CoreError::Closed | CoreError::HandoffClosed)
    }
}
