//! Handles to in-flight task invocations.
//!
//! A [`TaskFuture`] resolves to a final [`State`]. It can be waited on from a plain
//! thread ([`TaskFuture::wait`]), awaited from async code ([`TaskFuture::wait_async`]
//! or `.await`), or observed through [`TaskFuture::on_done`] callbacks.
mod seq;

use std::{
    fmt,
    future::{Future, IntoFuture},
    hash::{Hash, Hasher},
    pin::Pin,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, trace};

use strand_model::{RunId, State, StateData, TaskError};

type DoneCallback = Box<dyn FnOnce() + Send>;

struct Slot {
    state: State,
    callbacks: Vec<DoneCallback>,
}

struct Inner {
    run_id: RunId,
    seq: u64,
    task_name: String,
    slot: Mutex<Slot>,
    settled: Condvar,
    notify: Notify,
}

/// Shared, read-only handle to a task invocation's outcome.
///
/// Clones observe the same state. Only the runner that created the future can move it forward.
#[derive(Clone)]
pub struct TaskFuture {
    inner: Arc<Inner>,
}

impl TaskFuture {
    pub(crate) fn new(run_id: RunId, task_name: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                run_id,
                seq: seq::next_seq(),
                task_name: task_name.to_string(),
                slot: Mutex::new(Slot {
                    state: State::pending(),
                    callbacks: Vec::new(),
                }),
                settled: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A panic inside a callback never runs under this lock, so a poisoned slot still holds a consistent state.
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn run_id(&self) -> RunId {
        self.inner.run_id
    }

    pub fn task_name(&self) -> &str {
        &self.inner.task_name
    }

    pub(crate) fn seq(&self) -> u64 {
        self.inner.seq
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> State {
        self.lock().state.clone()
    }

    /// `true` once the state is final.
    pub fn is_done(&self) -> bool {
        self.lock().state.is_final()
    }

    fn final_state(&self) -> Option<State> {
        let slot = self.lock();
        slot.state.is_final().then(|| slot.state.clone())
    }

    /// Move the future to `next`.
    ///
    /// Returns `false` and leaves the state untouched if the transition is not allowed.
    pub(crate) fn transition(&self, next: State) -> bool {
        let callbacks = {
            let mut slot = self.lock();
            let from = slot.state.kind();
            if !from.can_transition_to(next.kind()) {
                debug!(
                    run = %self.inner.run_id,
                    from = %from,
                    to = %next.kind(),
                    "ignoring invalid state transition"
                );
                return false;
            }
            trace!(run = %self.inner.run_id, from = %from, to = %next.kind(), "state transition");
            let settled = next.is_final();
            slot.state = next;
            if !settled {
                return true;
            }
            std::mem::take(&mut slot.callbacks)
        };

        self.inner.settled.notify_all();
        self.inner.notify.notify_waiters();
        for callback in callbacks {
            callback();
        }
        true
    }

    /// Run `callback` once the future settles.
    ///
    /// Runs immediately on the calling thread if the future is already final,
    /// otherwise on the thread that settles it.
    pub fn on_done(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut slot = self.lock();
            if !slot.state.is_final() {
                slot.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }

    /// Block the calling thread until the state is final or `timeout` elapses.
    ///
    /// Returns `None` on timeout. Must not be called from inside an async task;
    /// use [`TaskFuture::wait_async`] there.
    pub fn wait(&self, timeout: Option<Duration>) -> Option<State> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.lock();
        loop {
            if slot.state.is_final() {
                return Some(slot.state.clone());
            }
            slot = match deadline {
                None => self
                    .inner
                    .settled
                    .wait(slot)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.inner
                        .settled
                        .wait_timeout(slot, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }
    }

    async fn settled(&self) -> State {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(state) = self.final_state() {
                return state;
            }
            notified.await;
        }
    }

    /// Suspend until the state is final or `timeout` elapses.
    pub async fn wait_async(&self, timeout: Option<Duration>) -> Option<State> {
        match timeout {
            None => Some(self.settled().await),
            Some(t) => tokio::time::timeout(t, self.settled()).await.ok(),
        }
    }

    /// Block until final, then extract the result.
    ///
    /// See [`State::result`] for `raise_on_failure`.
    pub fn result(&self, raise_on_failure: bool) -> Result<StateData, TaskError> {
        self.wait(None)
            .unwrap_or_else(|| self.state())
            .result(raise_on_failure)
    }

    /// Async form of [`TaskFuture::result`].
    pub async fn result_async(&self, raise_on_failure: bool) -> Result<StateData, TaskError> {
        self.settled().await.result(raise_on_failure)
    }

    /// Block until final and return the completed value, raising any failure.
    pub fn value(&self) -> Result<Value, TaskError> {
        self.wait(None).unwrap_or_else(|| self.state()).value()
    }

    /// Async form of [`TaskFuture::value`].
    pub async fn value_async(&self) -> Result<Value, TaskError> {
        self.settled().await.value()
    }
}

impl IntoFuture for TaskFuture {
    type Output = State;
    type IntoFuture = Pin<Box<dyn Future<Output = State> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.settled().await })
    }
}

impl PartialEq for TaskFuture {
    fn eq(&self, other: &Self) -> bool {
        self.inner.run_id == other.inner.run_id
    }
}

impl Eq for TaskFuture {}

impl Hash for TaskFuture {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.run_id.hash(state);
    }
}

impl fmt::Debug for TaskFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("run_id", &self.inner.run_id)
            .field("task", &self.inner.task_name)
            .field("kind", &self.lock().state.kind())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn detached(task_name: &str) -> TaskFuture {
    TaskFuture::new(RunId::new(), task_name)
}
