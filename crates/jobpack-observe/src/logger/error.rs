use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?} (expected text, json or journald)")]
    UnknownFormat(String),

    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("journald output unavailable: {0}")]
    Journald(String),

    #[error("logger already installed: {0}")]
    AlreadyInstalled(String),
}
