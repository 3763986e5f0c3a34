mod error;
pub use error::ApiError;

mod handler;
pub use handler::{ApiHandler, HealthReport, RoleHealth};

mod adapter;
pub use adapter::TaskManagerAdapter;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpApi;

#[cfg(feature = "http")]
pub use axum;
