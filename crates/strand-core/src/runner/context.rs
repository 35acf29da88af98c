use std::fmt;

use crate::metrics::{MetricsHandle, noop_metrics};

/// Shared dependencies handed to every run of a runner.
#[derive(Clone)]
pub struct RunnerContext {
    metrics: MetricsHandle,
}

impl RunnerContext {
    /// Create a new context with the given params.
    pub fn new(metrics: MetricsHandle) -> Self {
        Self { metrics }
    }

    /// Get a reference to the metrics backend.
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    /// Replace the metrics backend and return updated context.
    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Default for RunnerContext {
    fn default() -> Self {
        Self {
            metrics: noop_metrics(),
        }
    }
}

impl fmt::Debug for RunnerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerContext")
            .field("metrics", &"<handle>")
            .finish()
    }
}

impl fmt::Display for RunnerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RunnerContext")
    }
}

#[cfg(test)]
mod tests {
    use super::RunnerContext;
    use crate::metrics::TaskOutcome;

    #[test]
    fn default_context_uses_noop_metrics() {
        let ctx = RunnerContext::default();
        ctx.metrics().record_task_submitted("test");
        ctx.metrics()
            .record_task_finished("test", TaskOutcome::Success, 100);
    }

    #[test]
    fn metrics_handle_can_be_cloned() {
        let ctx = RunnerContext::default().with_metrics(crate::metrics::noop_metrics());
        let handle = ctx.metrics().clone();
        handle.record_dispatch_error("test", "connect");
        assert_eq!(ctx.to_string(), "RunnerContext");
    }
}
