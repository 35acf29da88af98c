use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ModelError;

/// Category of a failed invocation as reported across the substrate boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// The callable returned an error.
    Raised,
    /// The callable panicked.
    Panicked,
    /// The per-call timeout expired.
    TimedOut,
    /// The execution received an external interrupt.
    Interrupted,
    /// The worker forcibly terminated the call.
    Killed,
    /// The call was cancelled before it could finish.
    Cancelled,
    /// The worker or the connection to it went away.
    WorkerLost,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raised => "raised",
            Self::Panicked => "panicked",
            Self::TimedOut => "timedOut",
            Self::Interrupted => "interrupted",
            Self::Killed => "killed",
            Self::Cancelled => "cancelled",
            Self::WorkerLost => "workerLost",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "raised" | "error" => Ok(Self::Raised),
            "panicked" | "panic" => Ok(Self::Panicked),
            "timedout" | "timeout" => Ok(Self::TimedOut),
            "interrupted" | "interrupt" => Ok(Self::Interrupted),
            "killed" => Ok(Self::Killed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "workerlost" | "lost" => Ok(Self::WorkerLost),
            _ => Err(ModelError::UnknownFailureKind(s.to_string())),
        }
    }
}

/// Structured error envelope for a failed invocation.
///
/// Callables return it instead of arbitrary error types so that failures survive serialization unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Ordinary error raised by task logic.
    pub fn raised(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Raised, message)
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Panicked, message)
    }

    /// Timeout failure; the message names the configured limit.
    pub fn timed_out(timeout: Duration) -> Self {
        Self::new(
            FailureKind::TimedOut,
            format!(
                "Task run exceeded timeout of {} second(s)",
                timeout.as_secs_f64()
            ),
        )
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Interrupted, message)
    }

    pub fn killed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Killed, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, message)
    }

    pub fn worker_lost(message: impl Into<String>) -> Self {
        Self::new(FailureKind::WorkerLost, message)
    }
}
