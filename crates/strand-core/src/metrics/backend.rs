use std::sync::Arc;

use strand_model::StateKind;

/// Final outcome of a run, as seen by metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Run completed.
    Success,
    /// Callable raised or panicked.
    Failure,
    /// Run exceeded its timeout.
    Timeout,
    /// Run was terminated out-of-band.
    Crashed,
    /// Run was never dispatched because an upstream did not complete.
    NotReady,
}

impl TaskOutcome {
    /// Return label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskOutcome::Success => "success",
            TaskOutcome::Failure => "failure",
            TaskOutcome::Timeout => "timeout",
            TaskOutcome::Crashed => "crashed",
            TaskOutcome::NotReady => "not_ready",
        }
    }

    /// Map a final state kind to an outcome; `timed_out` refines `Failed`.
    pub fn from_kind(kind: StateKind, timed_out: bool) -> Self {
        match kind {
            StateKind::Completed => TaskOutcome::Success,
            StateKind::Failed if timed_out => TaskOutcome::Timeout,
            StateKind::Crashed => TaskOutcome::Crashed,
            StateKind::NotReady | StateKind::Pending => TaskOutcome::NotReady,
            _ => TaskOutcome::Failure,
        }
    }
}

/// Backend metrics collection interface.
///
/// Implementations are injected through [`crate::RunnerContext`] and shared by every run of a runner.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record an accepted submission.
    ///
    /// # Arguments
    /// - `substrate`: connector name of the runner's session
    fn record_task_submitted(&self, substrate: &str);
    /// Record a run reaching its final state.
    ///
    /// # Arguments
    /// - `substrate`: connector name of the runner's session
    /// - `outcome`: how the run ended
    /// - `duration_ms`: time from submission to final state
    fn record_task_finished(&self, substrate: &str, outcome: TaskOutcome, duration_ms: u64);
    /// Record a substrate-level error while dispatching.
    ///
    /// This is separate from task failures, which arrive through `record_task_finished`.
    fn record_dispatch_error(&self, substrate: &str, error_kind: &str);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_outcomes() {
        assert_eq!(TaskOutcome::from_kind(StateKind::Completed, false), TaskOutcome::Success);
        assert_eq!(TaskOutcome::from_kind(StateKind::Failed, false), TaskOutcome::Failure);
        assert_eq!(TaskOutcome::from_kind(StateKind::Failed, true), TaskOutcome::Timeout);
        assert_eq!(TaskOutcome::from_kind(StateKind::Crashed, false), TaskOutcome::Crashed);
        assert_eq!(TaskOutcome::from_kind(StateKind::NotReady, false), TaskOutcome::NotReady);
    }
}
