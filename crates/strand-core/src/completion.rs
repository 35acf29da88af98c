//! Completion-order iteration over a set of futures.
//!
//! [`as_completed`] and [`as_completed_stream`] yield each distinct future exactly
//! once, in the order the futures settle. With a timeout, expiry yields a single
//! [`CoreError::CompletionWaitTimedOut`] naming the futures still outstanding and
//! then ends the sequence.
use std::{
    collections::HashSet,
    future::Future,
    pin::Pin,
    sync::mpsc,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use futures::Stream;
use tokio::{sync::mpsc as async_mpsc, time::Sleep};

use crate::{error::CoreError, future::TaskFuture};

struct Pending {
    slots: Vec<Option<TaskFuture>>,
    remaining: usize,
}

impl Pending {
    fn new(futures: impl IntoIterator<Item = TaskFuture>, notify: impl Fn(usize) + Clone + Send + 'static) -> Self {
        let mut seen = HashSet::new();
        let slots: Vec<_> = futures
            .into_iter()
            .filter(|f| seen.insert(f.run_id()))
            .map(Some)
            .collect();
        let remaining = slots.len();
        for (idx, f) in slots.iter().flatten().enumerate() {
            let notify = notify.clone();
            f.on_done(move || notify(idx));
        }
        Self { slots, remaining }
    }

    fn take(&mut self, idx: usize) -> Option<TaskFuture> {
        let f = self.slots.get_mut(idx)?.take()?;
        self.remaining -= 1;
        Some(f)
    }

    fn timed_out(&self) -> CoreError {
        CoreError::CompletionWaitTimedOut {
            outstanding: self.slots.iter().flatten().map(TaskFuture::run_id).collect(),
        }
    }
}

/// Blocking completion-order iterator. See [`as_completed`].
pub struct AsCompleted {
    pending: Pending,
    rx: mpsc::Receiver<usize>,
    deadline: Option<Instant>,
    done: bool,
}

/// Iterate `futures` in completion order, blocking the calling thread between items.
///
/// `timeout` bounds the whole iteration, not each item.
pub fn as_completed(
    futures: impl IntoIterator<Item = TaskFuture>,
    timeout: Option<Duration>,
) -> AsCompleted {
    let (tx, rx) = mpsc::channel();
    let pending = Pending::new(futures, move |idx| {
        let _ = tx.send(idx);
    });
    AsCompleted {
        pending,
        rx,
        deadline: timeout.map(|t| Instant::now() + t),
        done: false,
    }
}

impl AsCompleted {
    /// Futures not yet yielded.
    pub fn remaining(&self) -> usize {
        self.pending.remaining
    }
}

impl Iterator for AsCompleted {
    type Item = Result<TaskFuture, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.pending.remaining > 0 {
            let received = match self.deadline {
                None => self.rx.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
                Some(deadline) => self
                    .rx
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
            };
            match received {
                Ok(idx) => {
                    if let Some(f) = self.pending.take(idx) {
                        return Some(Ok(f));
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    self.done = true;
                    return Some(Err(self.pending.timed_out()));
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => self.done = true,
            }
        }
        None
    }
}

/// Async completion-order stream. See [`as_completed_stream`].
pub struct AsCompletedStream {
    pending: Pending,
    rx: async_mpsc::UnboundedReceiver<usize>,
    deadline: Option<Instant>,
    sleep: Option<Pin<Box<Sleep>>>,
    done: bool,
}

/// Stream `futures` in completion order.
///
/// The timeout clock starts now; the stream must be polled inside a tokio runtime.
pub fn as_completed_stream(
    futures: impl IntoIterator<Item = TaskFuture>,
    timeout: Option<Duration>,
) -> AsCompletedStream {
    let (tx, rx) = async_mpsc::unbounded_channel();
    let pending = Pending::new(futures, move |idx| {
        let _ = tx.send(idx);
    });
    AsCompletedStream {
        pending,
        rx,
        deadline: timeout.map(|t| Instant::now() + t),
        sleep: None,
        done: false,
    }
}

impl Stream for AsCompletedStream {
    type Item = Result<TaskFuture, CoreError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        while !this.done && this.pending.remaining > 0 {
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(idx)) => {
                    if let Some(f) = this.pending.take(idx) {
                        return Poll::Ready(Some(Ok(f)));
                    }
                    continue;
                }
                Poll::Ready(None) => {
                    this.done = true;
                    break;
                }
                Poll::Pending => {}
            }

            let Some(deadline) = this.deadline else {
                return Poll::Pending;
            };
            let sleep = this
                .sleep
                .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline.into())));
            if sleep.as_mut().poll(cx).is_ready() {
                this.done = true;
                return Poll::Ready(Some(Err(this.pending.timed_out())));
            }
            return Poll::Pending;
        }
        Poll::Ready(None)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.pending.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::detached;
    use futures::StreamExt;
    use serde_json::json;
    use strand_model::State;

    fn complete_after(f: &TaskFuture, ms: u64) -> std::thread::JoinHandle<()> {
        let f = f.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(ms));
            f.transition(State::completed(json!(ms)));
        })
    }

    #[test]
    fn yields_in_completion_order() {
        let slow = detached("slow");
        let mid = detached("mid");
        let fast = detached("fast");
        let threads = vec![
            complete_after(&slow, 300),
            complete_after(&mid, 150),
            complete_after(&fast, 10),
        ];

        let order: Vec<_> = as_completed([slow.clone(), mid.clone(), fast.clone()], None)
            .map(|r| r.unwrap().task_name().to_string())
            .collect();
        assert_eq!(order, vec!["fast", "mid", "slow"]);
        threads.into_iter().for_each(|t| t.join().unwrap());
    }

    #[test]
    fn duplicates_are_yielded_once() {
        let a = detached("a");
        a.transition(State::completed(json!(1)));
        let items: Vec<_> = as_completed([a.clone(), a.clone()], None).collect();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn empty_input_ends_immediately() {
        assert!(as_completed(Vec::new(), Some(Duration::ZERO)).next().is_none());
    }

    #[test]
    fn timeout_reports_outstanding_then_ends() {
        let done = detached("done");
        done.transition(State::completed(json!(1)));
        let stuck = detached("stuck");

        let mut it = as_completed([done.clone(), stuck.clone()], Some(Duration::from_millis(30)));
        assert_eq!(it.next().unwrap().unwrap(), done);
        match it.next() {
            Some(Err(CoreError::CompletionWaitTimedOut { outstanding })) => {
                assert_eq!(outstanding, vec![stuck.run_id()]);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(it.next().is_none());
    }

    #[tokio::test]
    async fn stream_yields_in_completion_order() {
        let a = detached("a");
        let b = detached("b");
        for (f, ms) in [(a.clone(), 60u64), (b.clone(), 5)] {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                f.transition(State::completed(json!(ms)));
            });
        }
        let names: Vec<_> = as_completed_stream([a, b], Some(Duration::from_secs(5)))
            .map(|r| r.unwrap().task_name().to_string())
            .collect()
            .await;
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn stream_times_out() {
        let stuck = detached("stuck");
        let mut s = as_completed_stream([stuck.clone()], Some(Duration::from_millis(20)));
        assert!(matches!(
            s.next().await,
            Some(Err(CoreError::CompletionWaitTimedOut { .. }))
        ));
        assert!(s.next().await.is_none());
    }
}
