use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use strand_model::{
    Args, BackoffStrategy, FailureKind, RemoteOptions, RetryStrategy, StateKind, TaskError,
};

use super::*;
use crate::{
    context::with_remote_options,
    substrate::{Connector, RemoteCall, Session, SubstrateError},
    task::Callable,
};

/// Runs callables on the current runtime; records the options of every call.
#[derive(Default)]
struct InlineSession {
    seen: Mutex<Vec<RemoteOptions>>,
    closed: CancellationToken,
}

#[async_trait]
impl Session for InlineSession {
    fn address(&self) -> &str {
        "inline"
    }

    async fn dispatch(&self, call: RemoteCall) -> Result<RemoteHandle, SubstrateError> {
        if self.closed.is_cancelled() {
            return Err(SubstrateError::SessionClosed);
        }
        self.seen
            .lock()
            .unwrap()
            .push(call.options.clone());
        let RemoteCall {
            run_id, task, args, ..
        } = call;
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let work_token = token.clone();
            let work = async move {
                match task.callable() {
                    Callable::Blocking(f) => f(args),
                    Callable::Async(f) => f(args, work_token).await,
                }
            };
            let outcome = tokio::select! {
                r = work => r.map_err(SubstrateError::Task),
                _ = token.cancelled() => Err(SubstrateError::Cancelled("cancelled by runner".into())),
            };
            let _ = tx.send(outcome);
        });
        Ok(RemoteHandle::new(run_id, rx, cancel))
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}

struct InlineConnector {
    session: Arc<InlineSession>,
    owned: bool,
}

#[async_trait]
impl Connector for InlineConnector {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn supports(&self, _address: Option<&str>) -> bool {
        true
    }

    async fn connect(&self, _config: &RunnerConfig) -> Result<Attachment, SubstrateError> {
        Ok(Attachment {
            session: self.session.clone(),
            owned: self.owned,
        })
    }
}

fn runner_with(owned: bool) -> (TaskRunner, Arc<InlineSession>) {
    let session = Arc::new(InlineSession::default());
    let router = ConnectorRouter::new().with(Arc::new(InlineConnector {
        session: Arc::clone(&session),
        owned,
    }));
    (TaskRunner::new(RunnerConfig::default(), Arc::new(router)), session)
}

fn value_task(name: &str, v: Value) -> Task {
    Task::blocking(name, move |_| Ok::<_, TaskFailure>(v.clone()))
}

fn raising(name: &str) -> Task {
    let msg = format!("{name} exploded");
    Task::blocking(name, move |_| Err::<Value, _>(TaskFailure::raised(msg.clone())))
}

fn sleeping(name: &str, ms: u64) -> Task {
    Task::asynchronous(name, move |_args: Args, _cancel| async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok::<_, TaskFailure>(ms)
    })
}

#[tokio::test]
async fn submit_requires_started_runner() {
    let (runner, _) = runner_with(true);
    let err = runner
        .submit(&value_task("t", json!(1)), Parameters::new(), &[])
        .unwrap_err();
    assert!(matches!(err, CoreError::RunnerNotReady));
}

#[tokio::test]
async fn start_twice_fails() {
    let (runner, _) = runner_with(true);
    runner.start().await.unwrap();
    assert!(matches!(runner.start().await, Err(CoreError::AlreadyStarted)));
    runner.shutdown().await;
}

#[tokio::test]
async fn completed_value_round_trips() {
    let (runner, _) = runner_with(true);
    runner.start().await.unwrap();
    let f = runner
        .submit(&value_task("t", json!({"k": 1})), Parameters::new(), &[])
        .unwrap();
    assert_eq!(f.value_async().await.unwrap(), json!({"k": 1}));
    assert_eq!(runner.inflight(), 0);
    runner.shutdown().await;
}

#[tokio::test]
async fn parameters_carry_upstream_values() {
    let (runner, _) = runner_with(true);
    runner.start().await.unwrap();
    let add = Task::blocking("add", |args| {
        let a: i64 = args.get("a")?;
        let b: i64 = args.get("b")?;
        Ok::<_, TaskFailure>(a + b)
    });
    let one = runner.submit(&value_task("one", json!(1)), Parameters::new(), &[]).unwrap();
    let sum = runner
        .submit(&add, Parameters::new().with("a", &one).with("b", json!(41)), &[])
        .unwrap();
    assert_eq!(sum.value_async().await.unwrap(), json!(42));
    runner.shutdown().await;
}

#[tokio::test]
async fn failure_chain_reports_immediate_upstream() {
    let (runner, _) = runner_with(true);
    runner.start().await.unwrap();
    let b = runner.submit(&raising("b"), Parameters::new(), &[]).unwrap();
    let c = runner
        .submit(&value_task("c", json!(null)), Parameters::new().with("x", &b), &[])
        .unwrap();
    let d = runner
        .submit(&value_task("d", json!(null)), Parameters::new(), &[c.clone()])
        .unwrap();

    let sb = b.clone().await;
    assert!(sb.is_failed());
    assert_eq!(sb.message(), Some("b exploded"));

    let sc = c.clone().await;
    let sd = d.clone().await;
    assert_eq!(sc.kind(), StateKind::NotReady);
    assert!(sc.message().unwrap().contains(&b.run_id().to_string()));
    assert_eq!(sd.kind(), StateKind::NotReady);
    assert!(sd.message().unwrap().contains(&c.run_id().to_string()));
    assert!(matches!(
        d.result_async(true).await,
        Err(TaskError::DependencyNotSatisfied(_))
    ));
    runner.shutdown().await;
}

#[tokio::test]
async fn timeout_fails_run_and_names_limit() {
    let (runner, _) = runner_with(true);
    runner.start().await.unwrap();
    let slow = sleeping("slow", 5_000).with_timeout(Duration::from_millis(50));
    let f = runner.submit(&slow, Parameters::new(), &[]).unwrap();
    let state = f.await;
    assert!(state.is_failed());
    assert_eq!(state.name(), "TimedOut");
    assert!(state.message().unwrap().contains("0.05"));
    runner.shutdown().await;
}

#[tokio::test]
async fn failed_runs_are_retried() {
    let (runner, _) = runner_with(true);
    runner.start().await.unwrap();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let flaky = Task::blocking("flaky", move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(TaskFailure::raised("not yet"))
        } else {
            Ok(json!("ok"))
        }
    })
    .with_retry(RetryStrategy::new(3, BackoffStrategy::immediate()));

    let f = runner.submit(&flaky, Parameters::new(), &[]).unwrap();
    assert_eq!(f.value_async().await.unwrap(), json!("ok"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    runner.shutdown().await;
}

#[tokio::test]
async fn scoped_max_retries_overrides_task_retries() {
    let (runner, session) = runner_with(true);
    runner.start().await.unwrap();
    let task = raising("r").with_retry(RetryStrategy::new(5, BackoffStrategy::immediate()));
    let f = with_remote_options(RemoteOptions::new().with_max_retries(1), async {
        runner.submit(&task, Parameters::new(), &[]).unwrap()
    })
    .await;
    assert!(f.await.is_failed());
    let seen = session.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|o| o.max_retries == Some(1)));
    runner.shutdown().await;
}

#[tokio::test]
async fn scoped_labels_reach_the_substrate() {
    let (runner, session) = runner_with(true);
    runner.start().await.unwrap();
    let task = value_task("v", json!(1))
        .with_options(RemoteOptions::new().with_label("team", "ml").with_label("zone", "a"));
    let f = with_remote_options(RemoteOptions::new().with_label("zone", "b"), async {
        runner.submit(&task, Parameters::new(), &[]).unwrap()
    })
    .await;
    assert!(f.await.is_completed());
    let seen = session.seen.lock().unwrap().clone();
    assert_eq!(seen[0].labels.to_string(), "team=ml,zone=b");
    runner.shutdown().await;
}

#[tokio::test]
async fn shutdown_crashes_inflight_runs_without_waiting() {
    let (runner, session) = runner_with(true);
    runner.start().await.unwrap();
    let f = runner.submit(&sleeping("long", 60_000), Parameters::new(), &[]).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    tokio::time::timeout(Duration::from_secs(1), runner.shutdown())
        .await
        .expect("shutdown must not wait for callables");
    let state = f.state();
    assert!(state.is_crashed());
    assert_eq!(state.data().as_failure().unwrap().kind, FailureKind::Cancelled);
    assert!(session.closed.is_cancelled());
    assert_eq!(runner.inflight(), 0);
}

#[tokio::test]
async fn shared_session_is_not_closed_by_runner() {
    let (runner, session) = runner_with(false);
    runner.scope(async {}).await.unwrap();
    assert!(!session.closed.is_cancelled());
}

#[tokio::test]
async fn duplicate_is_equal_but_independent() {
    let (runner, _) = runner_with(true);
    runner.start().await.unwrap();
    let _f = runner.submit(&sleeping("s", 50), Parameters::new(), &[]).unwrap();

    let dup = runner.duplicate();
    assert!(!std::ptr::eq(&runner, &dup));
    assert_eq!(runner, dup);
    assert!(!dup.is_started());
    assert_eq!(dup.inflight(), 0);
    runner.shutdown().await;
}

#[tokio::test]
async fn wait_on_timeout_cancels_handle() {
    let (runner, session) = runner_with(true);
    runner.start().await.unwrap();
    let call = RemoteCall {
        run_id: RunId::new(),
        task: sleeping("s", 60_000),
        args: Args::new(),
        options: RemoteOptions::new(),
        attempt: 0,
    };
    let mut handle = session.dispatch(call).await.unwrap();
    let state = runner
        .wait_on_timeout(&mut handle, Duration::from_millis(30))
        .await;
    assert!(state.is_failed());
    assert!(handle.is_cancelled());
    runner.shutdown().await;
}
