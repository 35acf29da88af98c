//! Task runner: session lifecycle, submission and per-run dispatch.
//!
//! A [`TaskRunner`] is inert until [`TaskRunner::start`] acquires a session through
//! its [`ConnectorRouter`]. While started, [`TaskRunner::submit`] hands out
//! [`TaskFuture`]s immediately and drives each run on the runtime captured at start.
mod config;
pub use config::RunnerConfig;

mod context;
pub use context::RunnerContext;

mod driver;

use std::{
    fmt,
    future::Future,
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug_span, info, instrument, warn};

use strand_model::{RunId, State, TaskFailure};

use crate::{
    context::current_remote_options,
    error::CoreError,
    future::TaskFuture,
    params::Parameters,
    resolver::Upstreams,
    router::ConnectorRouter,
    substrate::{Attachment, RemoteHandle},
    task::Task,
};

use driver::{Inflight, Run, Shared};

struct ActiveSession {
    connector: &'static str,
    attachment: Attachment,
    runtime: Handle,
    shutdown: CancellationToken,
}

/// Client of a compute substrate.
///
/// Safe to share across threads; `submit` may be called concurrently.
pub struct TaskRunner {
    shared: Arc<Shared>,
    router: Arc<ConnectorRouter>,
    session: RwLock<Option<Arc<ActiveSession>>>,
}

impl TaskRunner {
    /// Create an inert runner.
    pub fn new(config: RunnerConfig, router: Arc<ConnectorRouter>) -> Self {
        Self {
            shared: Arc::new(Shared::new(config, RunnerContext::default())),
            router,
            session: RwLock::new(None),
        }
    }

    /// Replace the shared run context. Only meaningful before `start`.
    pub fn with_context(self, ctx: RunnerContext) -> Self {
        let config = self.shared.config.clone();
        Self {
            shared: Arc::new(Shared::new(config, ctx)),
            router: Arc::clone(&self.router),
            session: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.shared.config
    }

    pub fn context(&self) -> &RunnerContext {
        &self.shared.ctx
    }

    /// `true` between `start` and `shutdown`.
    pub fn is_started(&self) -> bool {
        self.active().is_some()
    }

    /// Number of runs submitted and not yet final.
    pub fn inflight(&self) -> usize {
        self.shared.inflight().len()
    }

    fn active(&self) -> Option<Arc<ActiveSession>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Acquire a session and begin accepting submissions.
    ///
    /// Must be called from within a tokio runtime; runs are driven on that runtime.
    #[instrument(level = "info", skip(self), fields(address = self.config().address().unwrap_or("<ephemeral>")))]
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.is_started() {
            return Err(CoreError::AlreadyStarted);
        }
        let (connector, attachment) = self.router.connect(&self.shared.config).await?;

        let raced = {
            let mut slot = self.session.write().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                true
            } else {
                *slot = Some(Arc::new(ActiveSession {
                    connector,
                    attachment: attachment.clone(),
                    runtime: Handle::current(),
                    shutdown: CancellationToken::new(),
                }));
                false
            }
        };
        if raced {
            if attachment.owned {
                attachment.session.close().await;
            }
            return Err(CoreError::AlreadyStarted);
        }

        info!(
            connector,
            session = attachment.session.address(),
            owned = attachment.owned,
            "task runner started"
        );
        Ok(())
    }

    /// Stop accepting submissions and release the session.
    ///
    /// Runs still in flight are cancelled and settle as crashed; the call does not wait
    /// for their callables to finish. A runner that is not started is left untouched.
    pub async fn shutdown(&self) {
        let active = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(active) = active else {
            return;
        };

        self.abandon(&active);
        if active.attachment.owned {
            active.attachment.session.close().await;
        }
        info!(connector = active.connector, "task runner shut down");
    }

    fn abandon(&self, active: &ActiveSession) {
        active.shutdown.cancel();
        let drained: Vec<Inflight> = self.shared.inflight().drain().map(|(_, e)| e).collect();
        if !drained.is_empty() {
            warn!(inflight = drained.len(), "cancelling runs still in flight");
        }
        for entry in drained {
            entry.cancel.cancel();
            let state = self.shared.config.crash_policy().state_for(TaskFailure::cancelled(
                "task runner shut down while the run was in flight",
            ));
            self.shared.finish(entry, state);
        }
    }

    /// Start, drive `body` to completion, then shut down.
    pub async fn scope<F: Future>(&self, body: F) -> Result<F::Output, CoreError> {
        self.start().await?;
        let out = body.await;
        self.shutdown().await;
        Ok(out)
    }

    /// Submit a run of `task` and return its future immediately.
    ///
    /// Futures embedded in `parameters` and every future in `wait_for` must complete
    /// before the run is dispatched; otherwise it settles as NOT_READY. Remote options
    /// in scope at the call site are captured now.
    #[instrument(level = "debug", skip_all, fields(task = %task.name()))]
    pub fn submit(
        &self,
        task: &Task,
        parameters: Parameters,
        wait_for: &[TaskFuture],
    ) -> Result<TaskFuture, CoreError> {
        let active = self.active().ok_or(CoreError::RunnerNotReady)?;

        let run_id = RunId::new();
        let future = TaskFuture::new(run_id, task.name());
        let upstreams = Upstreams::new(
            parameters
                .upstreams()
                .into_iter()
                .chain(wait_for.iter().cloned()),
        );
        let options = task.options().merged(&current_remote_options());
        let cancel = active.shutdown.child_token();

        {
            let mut inflight = self.shared.inflight();
            if inflight.contains_key(&run_id) {
                return Err(CoreError::DuplicateRun(run_id));
            }
            inflight.insert(
                run_id,
                Inflight {
                    future: future.clone(),
                    cancel: cancel.clone(),
                    submitted: Instant::now(),
                    connector: active.connector,
                },
            );
        }
        self.shared.ctx.metrics().record_task_submitted(active.connector);

        let span = debug_span!("run", run = %run_id, task = %task.name());
        active.runtime.spawn(
            driver::drive(Run {
                shared: Arc::clone(&self.shared),
                session: Arc::clone(&active.attachment.session),
                connector: active.connector,
                future: future.clone(),
                task: task.clone(),
                parameters,
                upstreams,
                options,
                cancel,
            })
            .instrument(span),
        );
        Ok(future)
    }

    /// Wait for a dispatched call for at most `timeout`.
    ///
    /// On expiry the call is cancelled and a timed-out FAILED state is returned,
    /// whether or not the substrate confirms the cancellation.
    pub async fn wait_on_timeout(&self, handle: &mut RemoteHandle, timeout: Duration) -> State {
        let shutdown = self
            .active()
            .map(|a| a.shutdown.child_token())
            .unwrap_or_default();
        driver::wait_on(
            handle,
            Some(timeout),
            &shutdown,
            self.shared.config.crash_policy(),
        )
        .await
    }

    /// A new inert runner with the same configuration, router and context.
    ///
    /// Shares no session and no in-flight runs with `self`.
    pub fn duplicate(&self) -> TaskRunner {
        TaskRunner {
            shared: Arc::new(Shared::new(
                self.shared.config.clone(),
                self.shared.ctx.clone(),
            )),
            router: Arc::clone(&self.router),
            session: RwLock::new(None),
        }
    }
}

impl PartialEq for TaskRunner {
    fn eq(&self, other: &Self) -> bool {
        self.shared.config == other.shared.config
    }
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("config", &self.shared.config)
            .field("router", &self.router)
            .field("started", &self.is_started())
            .field("inflight", &self.inflight())
            .finish()
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        let active = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(active) = active else {
            return;
        };
        warn!(connector = active.connector, "task runner dropped without shutdown");
        self.abandon(&active);
        if active.attachment.owned {
            let session = Arc::clone(&active.attachment.session);
            active.runtime.spawn(async move { session.close().await });
        }
    }
}

#[cfg(test)]
mod tests;
