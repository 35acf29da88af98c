//! Outcome records for task invocations.
mod error;
pub use error::TaskError;

mod failure;
pub use failure::{FailureKind, TaskFailure};

mod kind;
pub use kind::StateKind;

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::RunId;

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_seq() -> u64 {
    NEXT_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Name given to a failed state produced by a timeout.
pub const TIMED_OUT_NAME: &str = "TimedOut";

/// Payload carried by a [`State`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum StateData {
    #[default]
    None,
    /// Value returned by the callable.
    Value(Value),
    /// Captured failure for `Failed` and `Crashed` states.
    Error(TaskFailure),
}

impl StateData {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            StateData::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_failure(&self) -> Option<&TaskFailure> {
        match self {
            StateData::Error(f) => Some(f),
            _ => None,
        }
    }
}

/// Outcome record of a task invocation.
///
/// States are values: a new `State` is produced for every transition and the
/// owning future refuses to replace a final one.
///
/// `timestamp` is wall clock and only informative. Order states by [`State::seq`],
/// which increases monotonically within the process; a deserialized state is
/// sequenced when it arrives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    kind: StateKind,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default)]
    data: StateData,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    #[serde(skip, default = "next_seq")]
    seq: u64,
}

impl State {
    fn build(kind: StateKind, name: &str, message: Option<String>, data: StateData) -> Self {
        Self {
            kind,
            name: name.to_string(),
            message,
            data,
            timestamp: OffsetDateTime::now_utc(),
            seq: next_seq(),
        }
    }

    pub fn pending() -> Self {
        Self::build(StateKind::Pending, StateKind::Pending.default_name(), None, StateData::None)
    }

    pub fn running() -> Self {
        Self::build(StateKind::Running, StateKind::Running.default_name(), None, StateData::None)
    }

    pub fn completed(value: Value) -> Self {
        Self::build(
            StateKind::Completed,
            StateKind::Completed.default_name(),
            None,
            StateData::Value(value),
        )
    }

    /// Failed state carrying the original failure as data.
    pub fn failed(failure: TaskFailure) -> Self {
        let name = if failure.kind == FailureKind::TimedOut {
            TIMED_OUT_NAME
        } else {
            StateKind::Failed.default_name()
        };
        Self::build(
            StateKind::Failed,
            name,
            Some(failure.message.clone()),
            StateData::Error(failure),
        )
    }

    pub fn timed_out(timeout: Duration) -> Self {
        Self::failed(TaskFailure::timed_out(timeout))
    }

    pub fn crashed(failure: TaskFailure) -> Self {
        Self::build(
            StateKind::Crashed,
            StateKind::Crashed.default_name(),
            Some(format!("Execution was interrupted: {}", failure.message)),
            StateData::Error(failure),
        )
    }

    /// Pending state for a task that will not run because `upstream` did not complete.
    pub fn not_ready(upstream: &RunId) -> Self {
        Self::build(
            StateKind::NotReady,
            StateKind::NotReady.default_name(),
            Some(format!(
                "Upstream task run '{upstream}' did not reach a 'COMPLETED' state"
            )),
            StateData::None,
        )
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn data(&self) -> &StateData {
        &self.data
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    /// Creation order of this state within the process.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_pending(&self) -> bool {
        self.kind.is_pending()
    }

    pub fn is_running(&self) -> bool {
        self.kind == StateKind::Running
    }

    pub fn is_completed(&self) -> bool {
        self.kind == StateKind::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.kind == StateKind::Failed
    }

    pub fn is_crashed(&self) -> bool {
        self.kind == StateKind::Crashed
    }

    pub fn is_final(&self) -> bool {
        self.kind.is_final()
    }

    /// Extract the payload of a final state.
    ///
    /// With `raise_on_failure` the failure of a non-completed state is returned as
    /// an error; without it the state's data is returned whatever the outcome.
    /// A state that is not final yet is always an error.
    pub fn result(&self, raise_on_failure: bool) -> Result<StateData, TaskError> {
        if !self.kind.is_final() {
            return Err(TaskError::NotFinished(self.kind));
        }
        if !raise_on_failure || self.kind == StateKind::Completed {
            return Ok(self.data.clone());
        }
        Err(TaskError::from_state(self))
    }

    /// Returned value of a completed state, or the raised form of any other outcome.
    pub fn value(&self) -> Result<Value, TaskError> {
        match self.result(true)? {
            StateData::Value(v) => Ok(v),
            _ => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn completed_result_returns_value() {
        let s = State::completed(json!("a"));
        assert_eq!(s.value().unwrap(), json!("a"));
        assert_eq!(s.name(), "Completed");
    }

    #[test]
    fn failed_result_raises_original_failure() {
        let s = State::failed(TaskFailure::raised("This task fails!"));
        match s.result(true) {
            Err(TaskError::ExecutionFailed(f)) => assert_eq!(f.message, "This task fails!"),
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }
    }

    #[test]
    fn failed_result_without_raise_returns_data() {
        let s = State::failed(TaskFailure::raised("boom"));
        let data = s.result(false).unwrap();
        assert_eq!(data.as_failure().unwrap().message, "boom");
    }

    #[test]
    fn timeout_is_a_named_failed_state() {
        let s = State::timed_out(Duration::from_secs(1));
        assert!(s.is_failed());
        assert_eq!(s.name(), TIMED_OUT_NAME);
        assert!(s.message().unwrap().contains("1 second(s)"));
        assert!(matches!(s.result(true), Err(TaskError::TimedOut(_))));
    }

    #[test]
    fn crashed_state_is_named_crashed() {
        let s = State::crashed(TaskFailure::interrupted("keyboard interrupt"));
        assert_eq!(s.name(), "Crashed");
        assert!(matches!(s.result(true), Err(TaskError::Crashed(_))));
    }

    #[test]
    fn not_ready_message_names_upstream() {
        let up = RunId::new();
        let s = State::not_ready(&up);
        assert!(s.is_pending());
        assert_eq!(s.name(), "NotReady");
        assert_eq!(
            s.message().unwrap(),
            format!("Upstream task run '{up}' did not reach a 'COMPLETED' state")
        );
        assert!(matches!(s.result(true), Err(TaskError::DependencyNotSatisfied(_))));
    }

    #[test]
    fn unfinished_state_has_no_result() {
        assert!(matches!(
            State::running().result(false),
            Err(TaskError::NotFinished(StateKind::Running))
        ));
    }

    #[test]
    fn serde_roundtrip_keeps_payload() {
        let s = State::failed(TaskFailure::raised("boom"));
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"kind\":\"FAILED\""));
        let back: State = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), StateKind::Failed);
        assert_eq!(back.data(), s.data());
    }

    #[test]
    fn states_are_sequenced_in_creation_order() {
        let pending = State::pending();
        let running = State::running();
        let done = State::completed(json!(1));
        assert!(pending.seq() < running.seq());
        assert!(running.seq() < done.seq());

        let json = serde_json::to_string(&pending).unwrap();
        assert!(!json.contains("seq"));
        let back: State = serde_json::from_str(&json).unwrap();
        assert!(back.seq() > done.seq());
    }
}
