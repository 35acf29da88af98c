use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{FailureKind, State, StateKind, TaskFailure};

/// Decides which failures count as crashes.
///
/// Substrates disagree on what "external termination" means, so the set is
/// configuration rather than a fixed rule. Kinds outside the set produce
/// `Failed` states.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CrashPolicy {
    pub crash_kinds: BTreeSet<FailureKind>,
}

impl CrashPolicy {
    /// Policy with an explicit set of crash kinds.
    pub fn new(kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        Self {
            crash_kinds: kinds.into_iter().collect(),
        }
    }

    pub fn with_kind(mut self, kind: FailureKind) -> Self {
        self.crash_kinds.insert(kind);
        self
    }

    pub fn without_kind(mut self, kind: FailureKind) -> Self {
        self.crash_kinds.remove(&kind);
        self
    }

    pub fn classify(&self, failure: &TaskFailure) -> StateKind {
        if self.crash_kinds.contains(&failure.kind) {
            StateKind::Crashed
        } else {
            StateKind::Failed
        }
    }

    /// Wrap a failure into the state this policy assigns to it.
    pub fn state_for(&self, failure: TaskFailure) -> State {
        match self.classify(&failure) {
            StateKind::Crashed => State::crashed(failure),
            _ => State::failed(failure),
        }
    }
}

impl Default for CrashPolicy {
    fn default() -> Self {
        Self::new([
            FailureKind::Interrupted,
            FailureKind::Killed,
            FailureKind::Cancelled,
            FailureKind::WorkerLost,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_splits_programmatic_and_external() {
        let p = CrashPolicy::default();
        assert_eq!(p.classify(&TaskFailure::raised("x")), StateKind::Failed);
        assert_eq!(p.classify(&TaskFailure::panicked("x")), StateKind::Failed);
        assert_eq!(p.classify(&TaskFailure::interrupted("x")), StateKind::Crashed);
        assert_eq!(p.classify(&TaskFailure::worker_lost("x")), StateKind::Crashed);
    }

    #[test]
    fn policy_is_configurable() {
        let p = CrashPolicy::default()
            .with_kind(FailureKind::Panicked)
            .without_kind(FailureKind::Cancelled);
        assert_eq!(p.classify(&TaskFailure::panicked("x")), StateKind::Crashed);
        assert_eq!(p.classify(&TaskFailure::cancelled("x")), StateKind::Failed);
    }

    #[test]
    fn deserializes_from_kind_names() {
        let p: CrashPolicy =
            serde_json::from_str(r#"{"crashKinds": ["killed", "workerLost"]}"#).unwrap();
        assert_eq!(p, CrashPolicy::new([FailureKind::Killed, FailureKind::WorkerLost]));
    }
}
