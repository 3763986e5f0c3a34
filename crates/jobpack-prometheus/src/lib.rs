//! Prometheus metrics backend for the jobpack engine.
//!
//! [`PrometheusMetrics`] implements [`jobpack_core::MetricsBackend`] on its own [`Registry`].
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use jobpack_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let handle: jobpack_core::MetricsHandle = Arc::new(metrics.clone());
//! # let _ = handle;
//! let text = metrics.encode_text()?;
//! assert!(text.is_empty() || text.contains("jobpack_"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `jobpack_batches_submitted_total{backend}` - Counter
//! - `jobpack_batches_failed_total{backend}` - Counter
//! - `jobpack_batch_size{backend}` - Histogram
//! - `jobpack_tasks_completed_total{backend, outcome}` - Counter
//! - `jobpack_status_poll_failures_total{backend}` - Counter
//! - `jobpack_jobs_pending{backend}` - Gauge
//!
//! This crate does not serve `/metrics`; the daemon mounts [`PrometheusMetrics::encode_text`].

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
