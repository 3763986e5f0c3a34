use jobpack_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::{Json, http::StatusCode};
        use jobpack_model::ErrorResponse;

        let status = match &self {
            ApiError::InvalidRequest(_) | ApiError::Core(CoreError::MultiLine) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Core(CoreError::Closed | CoreError::Abandoned) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Core(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
