use serde::{Deserialize, Serialize};

use crate::ExitCode;

/// Reply to a task submission: `{"rc": <exit code>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub rc: ExitCode,
}

/// Body returned by the gateway when a submission could not be served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_response_shape() {
        let json = serde_json::to_string(&SubmitResponse { rc: ExitCode(2) }).unwrap();
        assert_eq!(json, r#"{"rc":2}"#);
    }
}
