//! Metrics seam for task runners.
//!
//! Backends (prometheus, statsd, ...) implement [`MetricsBackend`] and are injected through [`crate::RunnerContext`].
mod backend;
pub use backend::{MetricsBackend, MetricsHandle, TaskOutcome};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
