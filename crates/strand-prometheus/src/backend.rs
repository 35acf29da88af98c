use std::sync::Arc;

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry, proto::MetricFamily};

use strand_core::metrics::{MetricsBackend, TaskOutcome};

const NAMESPACE: &str = "strand";

/// Prometheus metrics backend for task runners.
///
/// Labels are bounded:
/// - `substrate`: connector names such as `local`, `inproc`, `remote`
/// - `outcome`: `success`, `failure`, `timeout`, `crashed`, `not_ready`
/// - `error_kind`: substrate error kinds such as `connect` or `worker_lost`
#[derive(Clone)]
pub struct PrometheusMetrics {
    submitted: CounterVec,
    finished: CounterVec,
    duration: HistogramVec,
    dispatch_errors: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Create a backend registering its collectors into `registry`.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let submitted = CounterVec::new(
            Opts::new("tasks_submitted_total", "Task runs accepted by a runner").namespace(NAMESPACE),
            &["substrate"],
        )?;
        registry.register(Box::new(submitted.clone()))?;

        let finished = CounterVec::new(
            Opts::new("tasks_finished_total", "Task runs that reached a final state")
                .namespace(NAMESPACE),
            &["substrate", "outcome"],
        )?;
        registry.register(Box::new(finished.clone()))?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "task_duration_seconds",
                "Time from submission to final state in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
            &["substrate"],
        )?;
        registry.register(Box::new(duration.clone()))?;

        let dispatch_errors = CounterVec::new(
            Opts::new("dispatch_errors_total", "Substrate errors raised while dispatching")
                .namespace(NAMESPACE),
            &["substrate", "error_kind"],
        )?;
        registry.register(Box::new(dispatch_errors.clone()))?;

        Ok(Self {
            submitted,
            finished,
            duration,
            dispatch_errors,
            registry,
        })
    }

    /// Create a backend with a private registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    /// Gather all metric families for exposition.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_task_submitted(&self, substrate: &str) {
        self.submitted.with_label_values(&[substrate]).inc();
    }

    fn record_task_finished(&self, substrate: &str, outcome: TaskOutcome, duration_ms: u64) {
        self.finished
            .with_label_values(&[substrate, outcome.as_label()])
            .inc();
        self.duration
            .with_label_values(&[substrate])
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_dispatch_error(&self, substrate: &str, error_kind: &str) {
        self.dispatch_errors
            .with_label_values(&[substrate, error_kind])
            .inc();
    }
}
