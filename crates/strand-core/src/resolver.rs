//! Dependency gate for submissions.
//!
//! A run may be dispatched only once every upstream future has COMPLETED. When
//! several upstreams block, the one submitted first is reported.
use std::collections::HashSet;

use strand_model::StateKind;

use crate::future::TaskFuture;

/// Outcome of dependency resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Ready,
    /// First non-completed upstream in submission order.
    Blocked(TaskFuture),
    /// Some upstream has not settled yet.
    Pending,
}

impl Resolution {
    pub fn is_ready(&self) -> bool {
        matches!(self, Resolution::Ready)
    }

    pub fn blocking_cause(&self) -> Option<&TaskFuture> {
        match self {
            Resolution::Blocked(f) => Some(f),
            _ => None,
        }
    }
}

/// Deduplicated set of upstream futures ordered by submission.
#[derive(Clone, Debug, Default)]
pub struct Upstreams {
    futures: Vec<TaskFuture>,
}

impl Upstreams {
    pub fn new(futures: impl IntoIterator<Item = TaskFuture>) -> Self {
        let mut seen = HashSet::new();
        let mut futures: Vec<_> = futures
            .into_iter()
            .filter(|f| seen.insert(f.run_id()))
            .collect();
        futures.sort_by_key(TaskFuture::seq);
        Self { futures }
    }

    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskFuture> {
        self.futures.iter()
    }

    /// Non-waiting check.
    ///
    /// Returns [`Resolution::Pending`] while any upstream is unsettled, even if a
    /// settled one already failed, so the reported cause does not depend on timing.
    pub fn check(&self) -> Resolution {
        let mut blocked = None;
        for f in &self.futures {
            match f.state().kind() {
                StateKind::Completed => {}
                kind if kind.is_final() => {
                    blocked.get_or_insert_with(|| f.clone());
                }
                _ => return Resolution::Pending,
            }
        }
        blocked.map_or(Resolution::Ready, Resolution::Blocked)
    }

    /// Wait for every upstream to settle, then resolve.
    pub async fn settle(&self) -> Resolution {
        for f in &self.futures {
            f.wait_async(None).await;
        }
        self.check()
    }
}

/// Resolve a set of upstream futures once they have all settled.
pub async fn resolve(wait_for: impl IntoIterator<Item = TaskFuture>) -> Resolution {
    Upstreams::new(wait_for).settle().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::detached;
    use serde_json::json;
    use strand_model::{RunId, State, TaskFailure};

    fn completed(name: &str) -> TaskFuture {
        let f = detached(name);
        f.transition(State::completed(json!(name)));
        f
    }

    fn failed(name: &str) -> TaskFuture {
        let f = detached(name);
        f.transition(State::failed(TaskFailure::raised(name)));
        f
    }

    #[test]
    fn empty_set_is_ready() {
        assert!(Upstreams::default().check().is_ready());
    }

    #[test]
    fn all_completed_is_ready() {
        let ups = Upstreams::new([completed("a"), completed("b")]);
        assert_eq!(ups.check(), Resolution::Ready);
    }

    #[test]
    fn pending_upstream_defers() {
        let ups = Upstreams::new([failed("a"), detached("b")]);
        assert_eq!(ups.check(), Resolution::Pending);
    }

    #[test]
    fn first_submitted_blocker_wins() {
        let first = failed("first");
        let second = failed("second");
        let ups = Upstreams::new([second.clone(), completed("ok"), first.clone()]);
        assert_eq!(ups.check().blocking_cause(), Some(&first));
    }

    #[test]
    fn not_ready_upstream_blocks() {
        let up = detached("up");
        up.transition(State::not_ready(&RunId::new()));
        let ups = Upstreams::new([up.clone()]);
        assert_eq!(ups.check(), Resolution::Blocked(up));
    }

    #[test]
    fn duplicates_are_collapsed() {
        let a = completed("a");
        let ups = Upstreams::new([a.clone(), a.clone(), a]);
        assert_eq!(ups.len(), 1);
    }

    #[tokio::test]
    async fn settle_waits_for_pending_upstreams() {
        let up = detached("up");
        let setter = up.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            setter.transition(State::crashed(TaskFailure::killed("gone")));
        });
        let res = resolve([up.clone()]).await;
        assert_eq!(res, Resolution::Blocked(up));
    }
}
