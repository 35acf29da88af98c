//! Prometheus backend for strand task runners.
//!
//! [`PrometheusMetrics`] implements [`strand_core::metrics::MetricsBackend`] and is installed
//! through a [`strand_core::RunnerContext`].
//!
//! ```rust
//! use std::sync::Arc;
//! use strand_core::{RunnerConfig, RunnerContext, TaskRunner};
//! use strand_prometheus::{Encoder, PrometheusMetrics, TextEncoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let ctx = RunnerContext::default().with_metrics(Arc::new(metrics.clone()));
//! # let _ = ctx;
//!
//! // Later, from whatever serves `/metrics`:
//! let text = TextEncoder::new().encode_to_string(&metrics.gather())?;
//! # let _ = text;
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `strand_tasks_submitted_total{substrate}`
//! - `strand_tasks_finished_total{substrate, outcome}`
//! - `strand_task_duration_seconds{substrate}`
//! - `strand_dispatch_errors_total{substrate, error_kind}`
//!
//! No HTTP endpoint is provided.

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
