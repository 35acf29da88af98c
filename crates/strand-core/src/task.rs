//! Task descriptors.
//!
//! A [`Task`] is a plain value: a name, a callable and the policies that apply to
//! every invocation. Cloning is cheap; the callable is reference counted.
use std::{fmt, future::Future, pin::Pin, sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use strand_model::{Args, RemoteOptions, RetryStrategy, TaskFailure};

/// Result returned by every callable.
pub type TaskResult = Result<Value, TaskFailure>;

/// Boxed future produced by an async callable.
pub type BoxTaskFuture = Pin<Box<dyn Future<Output = TaskResult> + Send + 'static>>;

type BlockingFn = dyn Fn(Args) -> TaskResult + Send + Sync;
type AsyncFn = dyn Fn(Args, CancellationToken) -> BoxTaskFuture + Send + Sync;

/// Executable body of a task.
#[derive(Clone)]
pub enum Callable {
    /// Synchronous body; substrates run it on a blocking thread.
    Blocking(Arc<BlockingFn>),
    /// Cooperative body; receives a token that fires when the call is cancelled.
    Async(Arc<AsyncFn>),
}

impl Callable {
    pub fn is_async(&self) -> bool {
        matches!(self, Callable::Async(_))
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Blocking(_) => f.write_str("Callable::Blocking"),
            Callable::Async(_) => f.write_str("Callable::Async"),
        }
    }
}

fn to_value<T: Serialize>(out: T) -> TaskResult {
    serde_json::to_value(out)
        .map_err(|e| TaskFailure::raised(format!("failed to serialize task result: {e}")))
}

/// Immutable task descriptor.
#[derive(Clone)]
pub struct Task {
    name: Arc<str>,
    callable: Callable,
    timeout: Option<Duration>,
    retry: RetryStrategy,
    options: RemoteOptions,
}

impl Task {
    /// Build a task from a synchronous function.
    ///
    /// ```rust
    /// use strand_core::Task;
    /// use strand_model::TaskFailure;
    ///
    /// let double = Task::blocking("double", |args| {
    ///     let n: i64 = args.get("n")?;
    ///     Ok::<_, TaskFailure>(n * 2)
    /// });
    /// assert_eq!(double.name(), "double");
    /// ```
    pub fn blocking<F, T>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args) -> Result<T, TaskFailure> + Send + Sync + 'static,
        T: Serialize,
    {
        let body = move |args: Args| f(args).and_then(to_value);
        Self::from_callable(name, Callable::Blocking(Arc::new(body)))
    }

    /// Build a task from an async function.
    pub fn asynchronous<F, Fut, T>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Args, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, TaskFailure>> + Send + 'static,
        T: Serialize,
    {
        let body = move |args: Args, cancel: CancellationToken| -> BoxTaskFuture {
            let fut = f(args, cancel);
            Box::pin(async move { fut.await.and_then(to_value) })
        };
        Self::from_callable(name, Callable::Async(Arc::new(body)))
    }

    pub fn from_callable(name: impl Into<String>, callable: Callable) -> Self {
        Self {
            name: Arc::from(name.into()),
            callable,
            timeout: None,
            retry: RetryStrategy::none(),
            options: RemoteOptions::default(),
        }
    }

    /// Fail any invocation that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Default remote options; ambient scopes layer on top.
    pub fn with_options(mut self, options: RemoteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn retry(&self) -> &RetryStrategy {
        &self.retry
    }

    pub fn options(&self) -> &RemoteOptions {
        &self.options
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("callable", &self.callable)
            .field("timeout", &self.timeout)
            .field("retries", &self.retry.retries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blocking_task_serializes_its_output() {
        let task = Task::blocking("concat", |args| {
            let b: String = args.get("b")?;
            Ok::<_, TaskFailure>(b + "c")
        });
        let Callable::Blocking(f) = task.callable() else {
            panic!("expected blocking callable");
        };
        let out = f(Args::new().with("b", json!("b"))).unwrap();
        assert_eq!(out, json!("bc"));
    }

    #[tokio::test]
    async fn async_task_receives_cancel_token() {
        let task = Task::asynchronous("cancel-aware", |_args, cancel: CancellationToken| async move {
            Ok::<_, TaskFailure>(cancel.is_cancelled())
        });
        let Callable::Async(f) = task.callable() else {
            panic!("expected async callable");
        };
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(f(Args::new(), token).await.unwrap(), json!(true));
    }

    #[test]
    fn builders_set_policies() {
        let task = Task::blocking("t", |_| Ok::<_, TaskFailure>(()))
            .with_timeout(Duration::from_millis(100))
            .with_retry(RetryStrategy::new(2, Default::default()))
            .with_options(RemoteOptions::new().with_num_cpus(2.0));
        assert_eq!(task.timeout(), Some(Duration::from_millis(100)));
        assert_eq!(task.retry().retries, 2);
        assert_eq!(task.options().num_cpus, Some(2.0));
    }
}
