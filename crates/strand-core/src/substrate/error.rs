use thiserror::Error;

use strand_model::TaskFailure;

/// Errors reported by a compute substrate.
///
/// These never reach callers directly: the runner folds every variant into a
/// [`TaskFailure`] through [`SubstrateError::into_failure`] and then into a state.
#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("failed to connect to '{address}': {reason}")]
    Connect { address: String, reason: String },

    #[error("session is closed")]
    SessionClosed,

    #[error("dispatch rejected: {0}")]
    Rejected(String),

    #[error("remote task failed: {0}")]
    Task(TaskFailure),

    #[error("worker killed the call: {0}")]
    Killed(String),

    #[error("call cancelled: {0}")]
    Cancelled(String),

    #[error("worker lost: {0}")]
    WorkerLost(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SubstrateError {
    /// Short category used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            SubstrateError::Connect { .. } => "connect",
            SubstrateError::SessionClosed => "session_closed",
            SubstrateError::Rejected(_) => "rejected",
            SubstrateError::Task(_) => "task",
            SubstrateError::Killed(_) => "killed",
            SubstrateError::Cancelled(_) => "cancelled",
            SubstrateError::WorkerLost(_) => "worker_lost",
            SubstrateError::Protocol(_) => "protocol",
            SubstrateError::Io(_) => "io",
        }
    }

    /// Re-wrap into the uniform failure taxonomy.
    pub fn into_failure(self) -> TaskFailure {
        match self {
            SubstrateError::Task(failure) => failure,
            SubstrateError::Killed(reason) => TaskFailure::killed(reason),
            SubstrateError::Cancelled(reason) => TaskFailure::cancelled(reason),
            SubstrateError::Rejected(reason) => TaskFailure::raised(reason),
            other @ (SubstrateError::Connect { .. }
            | SubstrateError::SessionClosed
            | SubstrateError::WorkerLost(_)
            | SubstrateError::Protocol(_)
            | SubstrateError::Io(_)) => TaskFailure::worker_lost(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_model::FailureKind;

    #[test]
    fn task_failures_pass_through_unchanged() {
        let f = SubstrateError::Task(TaskFailure::interrupted("sigint")).into_failure();
        assert_eq!(f.kind, FailureKind::Interrupted);
        assert_eq!(f.message, "sigint");
    }

    #[test]
    fn transport_errors_become_worker_lost() {
        for err in [
            SubstrateError::SessionClosed,
            SubstrateError::Protocol("bad frame".into()),
            SubstrateError::Io(std::io::Error::other("reset")),
        ] {
            assert_eq!(err.into_failure().kind, FailureKind::WorkerLost);
        }
    }

    #[test]
    fn termination_errors_keep_their_kind() {
        assert_eq!(SubstrateError::Killed("x".into()).into_failure().kind, FailureKind::Killed);
        assert_eq!(
            SubstrateError::Cancelled("x".into()).into_failure().kind,
            FailureKind::Cancelled
        );
    }
}
