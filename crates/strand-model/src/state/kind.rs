use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Lifecycle position of a task invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateKind {
    /// Submitted, waiting for upstreams or for dispatch.
    Pending,
    /// Accepted by the substrate and executing.
    Running,
    /// Callable returned normally.
    Completed,
    /// Callable raised or exceeded its timeout.
    Failed,
    /// Execution was terminated out-of-band.
    Crashed,
    /// Never dispatched because an upstream did not complete.
    ///
    /// This is a pending sub-case: [`StateKind::is_pending`] reports `true`.
    NotReady,
}

impl StateKind {
    /// `Completed`, `Failed` or `Crashed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Crashed)
    }

    /// Nothing further happens to this invocation in the current run.
    pub fn is_final(&self) -> bool {
        self.is_terminal() || matches!(self, Self::NotReady)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending | Self::NotReady)
    }

    /// Transition table for a single invocation.
    ///
    /// ```text
    /// Pending  -> Running | NotReady | Completed | Failed | Crashed
    /// Running  -> Completed | Failed | Crashed
    /// final    -> (nothing)
    /// ```
    pub fn can_transition_to(&self, next: StateKind) -> bool {
        match self {
            Self::Pending => !matches!(next, Self::Pending),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Crashed | Self::NotReady => false,
        }
    }

    /// Default human label for the kind.
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Crashed => "Crashed",
            Self::NotReady => "NotReady",
        }
    }

    /// Label value for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Crashed => "crashed",
            Self::NotReady => "not_ready",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateKind {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "crashed" => Ok(Self::Crashed),
            "not_ready" | "notready" => Ok(Self::NotReady),
            other => Err(ModelError::UnknownStateKind(other.to_string())),
        }
    }
}
