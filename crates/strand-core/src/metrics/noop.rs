use crate::metrics::backend::{MetricsBackend, TaskOutcome};

/// Metrics backend that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_task_submitted(&self, _: &str) {}

    #[inline(always)]
    fn record_task_finished(&self, _: &str, _: TaskOutcome, _: u64) {}

    #[inline(always)]
    fn record_dispatch_error(&self, _: &str, _: &str) {}
}
