//! Per-run driver: dependency gate, dispatch, timeout and retry.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use strand_model::{CrashPolicy, FailureKind, RemoteOptions, RunId, State, TaskFailure};

use crate::{
    future::TaskFuture,
    metrics::TaskOutcome,
    params::Parameters,
    resolver::{Resolution, Upstreams},
    substrate::{RemoteCall, RemoteHandle, SessionRef},
    task::Task,
};

use super::{RunnerConfig, RunnerContext};

pub(super) struct Inflight {
    pub(super) future: TaskFuture,
    pub(super) cancel: CancellationToken,
    pub(super) submitted: Instant,
    pub(super) connector: &'static str,
}

/// State shared by a runner and the drivers of its runs.
pub(super) struct Shared {
    pub(super) config: RunnerConfig,
    pub(super) ctx: RunnerContext,
    pub(super) inflight: Mutex<HashMap<RunId, Inflight>>,
}

impl Shared {
    pub(super) fn new(config: RunnerConfig, ctx: RunnerContext) -> Self {
        Self {
            config,
            ctx,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub(super) fn inflight(&self) -> MutexGuard<'_, HashMap<RunId, Inflight>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Finalize a run that is still tracked.
    pub(super) fn settle(&self, run_id: RunId, state: State) {
        let entry = self.inflight().remove(&run_id);
        if let Some(entry) = entry {
            self.finish(entry, state);
        }
    }

    /// Finalize an entry already removed from the in-flight map.
    pub(super) fn finish(&self, entry: Inflight, state: State) {
        let kind = state.kind();
        let timed_out = state
            .data()
            .as_failure()
            .is_some_and(|f| f.kind == FailureKind::TimedOut);
        if !entry.future.transition(state) {
            return;
        }
        debug!(run = %entry.future.run_id(), kind = %kind, "run finished");
        let elapsed = entry.submitted.elapsed().as_millis() as u64;
        self.ctx.metrics().record_task_finished(
            entry.connector,
            TaskOutcome::from_kind(kind, timed_out),
            elapsed,
        );
    }
}

/// Everything a driver needs to carry one run to its final state.
pub(super) struct Run {
    pub(super) shared: Arc<Shared>,
    pub(super) session: SessionRef,
    pub(super) connector: &'static str,
    pub(super) future: TaskFuture,
    pub(super) task: Task,
    pub(super) parameters: Parameters,
    pub(super) upstreams: Upstreams,
    pub(super) options: RemoteOptions,
    pub(super) cancel: CancellationToken,
}

fn shutdown_failure(dispatched: bool) -> TaskFailure {
    if dispatched {
        TaskFailure::cancelled("task runner shut down while the run was in flight")
    } else {
        TaskFailure::cancelled("task runner shut down before the run was dispatched")
    }
}

/// Wait for a dispatched call, cancelling it on timeout or shutdown.
pub(super) async fn wait_on(
    handle: &mut RemoteHandle,
    timeout: Option<Duration>,
    shutdown: &CancellationToken,
    crash: &CrashPolicy,
) -> State {
    let deadline = async move {
        match timeout {
            Some(t) => {
                tokio::time::sleep(t).await;
                t
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        outcome = handle.join() => match outcome {
            Ok(value) => State::completed(value),
            Err(e) => crash.state_for(e.into_failure()),
        },
        t = deadline => {
            handle.cancel();
            warn!(run = %handle.run_id(), timeout = ?t, "run exceeded timeout; cancelling");
            State::timed_out(t)
        }
        _ = shutdown.cancelled() => {
            handle.cancel();
            crash.state_for(shutdown_failure(true))
        }
    }
}

pub(super) async fn drive(run: Run) {
    let Run {
        shared,
        session,
        connector,
        future,
        task,
        parameters,
        upstreams,
        options,
        cancel,
    } = run;
    let run_id = future.run_id();
    let crash = shared.config.crash_policy().clone();

    let resolution = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            shared.settle(run_id, crash.state_for(shutdown_failure(false)));
            return;
        }
        r = upstreams.settle() => r,
    };
    if let Resolution::Blocked(upstream) = resolution {
        debug!(upstream = %upstream.run_id(), "upstream did not complete; run not dispatched");
        shared.settle(run_id, State::not_ready(&upstream.run_id()));
        return;
    }
    let args = match parameters.resolve() {
        Ok(args) => args,
        Err(upstream) => {
            shared.settle(run_id, State::not_ready(&upstream));
            return;
        }
    };

    let retries = options.max_retries.unwrap_or(task.retry().retries);
    let mut attempt = 0;
    let state = loop {
        let call = RemoteCall {
            run_id,
            task: task.clone(),
            args: args.clone(),
            options: options.clone(),
            attempt,
        };
        let dispatched = tokio::select! {
            biased;
            _ = cancel.cancelled() => break crash.state_for(shutdown_failure(attempt > 0)),
            r = session.dispatch(call) => r,
        };
        let mut handle = match dispatched {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, attempt, "dispatch failed");
                shared.ctx.metrics().record_dispatch_error(connector, e.kind());
                break crash.state_for(e.into_failure());
            }
        };
        if attempt == 0 {
            future.transition(State::running());
        }
        trace!(attempt, "call dispatched");

        let state = wait_on(&mut handle, task.timeout(), &cancel, &crash).await;
        if !state.is_failed() || attempt >= retries {
            break state;
        }

        let delay = task.retry().backoff.delay_for(attempt);
        attempt += 1;
        debug!(attempt, retries, delay = ?delay, message = state.message().unwrap_or(""), "retrying failed run");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break crash.state_for(shutdown_failure(true)),
            _ = tokio::time::sleep(delay) => {}
        }
    };

    shared.settle(run_id, state);
}
