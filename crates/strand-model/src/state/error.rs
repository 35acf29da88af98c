use thiserror::Error;

use super::{State, StateKind, TaskFailure};

/// Raised form of a state that did not complete.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("{0}")]
    ExecutionFailed(TaskFailure),

    #[error("{0}")]
    TimedOut(TaskFailure),

    #[error("task run crashed: {0}")]
    Crashed(TaskFailure),

    #[error("{0}")]
    DependencyNotSatisfied(String),

    #[error("task run has not finished (state: {0})")]
    NotFinished(StateKind),
}

impl TaskError {
    /// Build the error matching a non-completed state.
    pub(crate) fn from_state(state: &State) -> Self {
        let failure = || {
            state
                .data()
                .as_failure()
                .cloned()
                .unwrap_or_else(|| TaskFailure::raised(state.message().unwrap_or_default()))
        };
        match state.kind() {
            StateKind::Failed => {
                let f = failure();
                if f.kind == super::FailureKind::TimedOut {
                    TaskError::TimedOut(f)
                } else {
                    TaskError::ExecutionFailed(f)
                }
            }
            StateKind::Crashed => TaskError::Crashed(failure()),
            StateKind::NotReady => {
                TaskError::DependencyNotSatisfied(state.message().unwrap_or_default().to_string())
            }
            kind => TaskError::NotFinished(kind),
        }
    }

    /// Underlying failure, when the error carries one.
    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskError::ExecutionFailed(f) | TaskError::TimedOut(f) | TaskError::Crashed(f) => {
                Some(f)
            }
            _ => None,
        }
    }
}
