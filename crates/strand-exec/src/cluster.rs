//! In-process worker pool.
//!
//! A [`LocalCluster`] executes [`RemoteCall`]s on the current tokio runtime. It
//! admits calls through a semaphore of `capacity` slots; a call occupies
//! `ceil(num_cpus)` slots. Async callables are aborted on cancellation, blocking
//! callables are detached.
use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::{
    sync::{Semaphore, oneshot},
    task::JoinError,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, trace};

use strand_core::{
    Callable,
    substrate::{CallId, RemoteCall, RemoteHandle, RemoteOutcome, SubstrateError},
};
use strand_model::{RunId, TaskFailure};

use crate::ExecError;

struct Control {
    kill: CancellationToken,
}

struct ClusterInner {
    name: String,
    capacity: u32,
    slots: Arc<Semaphore>,
    shutdown: CancellationToken,
    runs: Mutex<HashMap<CallId, Control>>,
}

impl ClusterInner {
    fn runs(&self) -> MutexGuard<'_, HashMap<CallId, Control>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a worker pool. Clones share the pool.
#[derive(Clone)]
pub struct LocalCluster {
    inner: Arc<ClusterInner>,
}

enum Stop {
    Cancelled,
    Killed,
    Shutdown,
}

impl Stop {
    fn into_error(self) -> SubstrateError {
        match self {
            Stop::Cancelled => SubstrateError::Cancelled("call cancelled by client".into()),
            Stop::Killed => SubstrateError::Killed("call killed on the worker".into()),
            Stop::Shutdown => SubstrateError::Cancelled("cluster shut down".into()),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

fn joined(res: Result<Result<serde_json::Value, TaskFailure>, JoinError>) -> RemoteOutcome {
    match res {
        Ok(out) => out.map_err(SubstrateError::Task),
        Err(e) if e.is_panic() => Err(SubstrateError::Task(TaskFailure::panicked(
            panic_message(e.into_panic()),
        ))),
        Err(_) => Err(SubstrateError::Cancelled("call aborted".into())),
    }
}

impl LocalCluster {
    /// Create a pool with `workers` slots.
    pub fn new(name: impl Into<String>, workers: usize) -> Result<Self, ExecError> {
        if workers == 0 {
            return Err(ExecError::InvalidConfig(
                "cluster needs at least one worker".into(),
            ));
        }
        let capacity = u32::try_from(workers)
            .map_err(|_| ExecError::InvalidConfig(format!("too many workers: {workers}")))?;
        let name = name.into();
        info!(cluster = %name, capacity, "local cluster started");
        Ok(Self {
            inner: Arc::new(ClusterInner {
                name,
                capacity,
                slots: Arc::new(Semaphore::new(workers)),
                shutdown: CancellationToken::new(),
                runs: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Pool sized to the host's available parallelism.
    pub fn with_default_size(name: impl Into<String>) -> Result<Self, ExecError> {
        let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::new(name, workers)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn capacity(&self) -> u32 {
        self.inner.capacity
    }

    /// Calls admitted or waiting for slots.
    pub fn active(&self) -> usize {
        self.inner.runs().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    fn weight(&self, call: &RemoteCall) -> u32 {
        let cpus = call.options.num_cpus.unwrap_or(1.0);
        let wanted = if cpus.is_finite() && cpus > 0.0 {
            cpus.ceil() as u32
        } else {
            1
        };
        wanted.clamp(1, self.inner.capacity)
    }

    /// Execute `call`; cancelling the returned handle stops it.
    pub fn execute(&self, call: RemoteCall) -> Result<RemoteHandle, SubstrateError> {
        self.execute_with(call, CancellationToken::new())
    }

    /// Execute `call` under an externally owned cancellation token.
    ///
    /// Must be called within a tokio runtime.
    pub fn execute_with(
        &self,
        call: RemoteCall,
        cancel: CancellationToken,
    ) -> Result<RemoteHandle, SubstrateError> {
        if self.is_shut_down() {
            return Err(SubstrateError::SessionClosed);
        }
        let id = call.id();
        let kill = CancellationToken::new();
        {
            let mut runs = self.inner.runs();
            if runs.contains_key(&id) {
                return Err(SubstrateError::Rejected(format!(
                    "call {id} is already executing"
                )));
            }
            runs.insert(id, Control { kill: kill.clone() });
        }

        let run_id = id.run_id;
        let span = debug_span!(
            "call",
            cluster = %self.inner.name,
            call = %id,
            task = %call.task.name(),
            labels = %call.options.labels,
        );
        let (tx, rx) = oneshot::channel();
        let cluster = self.clone();
        let token = cancel.clone();
        tokio::spawn(
            async move {
                let outcome = cluster.run(call, &token, &kill).await;
                cluster.inner.runs().remove(&id);
                let _ = tx.send(outcome);
            }
            .instrument(span),
        );
        Ok(RemoteHandle::new(run_id, rx, cancel))
    }

    async fn stopped(&self, cancel: &CancellationToken, kill: &CancellationToken) -> Stop {
        tokio::select! {
            _ = cancel.cancelled() => Stop::Cancelled,
            _ = kill.cancelled() => Stop::Killed,
            _ = self.inner.shutdown.cancelled() => Stop::Shutdown,
        }
    }

    async fn run(
        &self,
        call: RemoteCall,
        cancel: &CancellationToken,
        kill: &CancellationToken,
    ) -> RemoteOutcome {
        let weight = self.weight(&call);
        let slots = Arc::clone(&self.inner.slots);
        let _permit = tokio::select! {
            permit = slots.acquire_many_owned(weight) => permit
                .map_err(|_| SubstrateError::Cancelled("cluster shut down".into()))?,
            stop = self.stopped(cancel, kill) => return Err(stop.into_error()),
        };
        trace!(run = %call.run_id, task = %call.task.name(), weight, "call admitted");

        let RemoteCall { task, args, .. } = call;
        match task.callable().clone() {
            Callable::Async(f) => {
                let mut join = tokio::spawn(f(args, cancel.child_token()));
                tokio::select! {
                    res = &mut join => joined(res),
                    stop = self.stopped(cancel, kill) => {
                        join.abort();
                        debug!(task = %task.name(), "async call aborted");
                        Err(stop.into_error())
                    }
                }
            }
            Callable::Blocking(f) => {
                let join = tokio::task::spawn_blocking(move || f(args));
                tokio::select! {
                    res = join => joined(res),
                    stop = self.stopped(cancel, kill) => {
                        debug!(task = %task.name(), "blocking call detached");
                        Err(stop.into_error())
                    }
                }
            }
        }
    }

    /// Terminate every attempt of a run out-of-band. Returns `false` if the run is unknown.
    pub fn kill(&self, run_id: &RunId) -> bool {
        let runs = self.inner.runs();
        let mut found = false;
        for control in runs
            .iter()
            .filter(|(id, _)| id.run_id == *run_id)
            .map(|(_, control)| control)
        {
            control.kill.cancel();
            found = true;
        }
        found
    }

    /// Cancel every queued and running call. Does not wait for them.
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.slots.close();
        info!(cluster = %self.inner.name, active = self.active(), "local cluster shut down");
    }
}

impl std::fmt::Debug for LocalCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCluster")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
