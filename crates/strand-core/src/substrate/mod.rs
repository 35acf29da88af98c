//! Seam between the runner and a compute substrate.
//!
//! A [`Connector`] acquires a [`Session`]; a session accepts [`RemoteCall`]s and
//! hands back [`RemoteHandle`]s. Connection modes differ only in how the session
//! is acquired, never in dispatch semantics.
mod error;
pub use error::SubstrateError;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use strand_model::{Args, RemoteOptions, RunId};

use crate::{runner::RunnerConfig, task::Task};

/// Outcome of a single remote call.
pub type RemoteOutcome = Result<Value, SubstrateError>;

/// One dispatch of a task invocation.
#[derive(Clone, Debug)]
pub struct RemoteCall {
    pub run_id: RunId,
    pub task: Task,
    pub args: Args,
    pub options: RemoteOptions,
    /// Zero-based attempt number.
    pub attempt: u32,
}

impl RemoteCall {
    pub fn id(&self) -> CallId {
        CallId {
            run_id: self.run_id,
            attempt: self.attempt,
        }
    }
}

/// Identity of a single attempt of a run.
///
/// Substrates track calls by this key, so a retry never collides with a
/// cancelled attempt of the same run that is still winding down.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallId {
    pub run_id: RunId,
    pub attempt: u32,
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.run_id, self.attempt)
    }
}

/// Handle to a dispatched call.
///
/// Owned by the runner; cancelling it asks the substrate to stop the work.
pub struct RemoteHandle {
    run_id: RunId,
    outcome: oneshot::Receiver<RemoteOutcome>,
    cancel: CancellationToken,
}

impl RemoteHandle {
    pub fn new(
        run_id: RunId,
        outcome: oneshot::Receiver<RemoteOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            outcome,
            cancel,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Request cancellation of the remote work. Delivery is best-effort.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the outcome.
    ///
    /// A substrate that drops the result channel is reported as a lost worker.
    pub async fn join(&mut self) -> RemoteOutcome {
        match (&mut self.outcome).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SubstrateError::WorkerLost(
                "substrate dropped the result channel".into(),
            )),
        }
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("run_id", &self.run_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Live connection to a compute substrate.
#[async_trait]
pub trait Session: Send + Sync {
    /// Address the session is attached to, for logs.
    fn address(&self) -> &str;

    /// Submit a call. Must not wait for the call to finish.
    async fn dispatch(&self, call: RemoteCall) -> Result<RemoteHandle, SubstrateError>;

    /// Release the session and cancel whatever it still runs.
    ///
    /// Must return without waiting for callables to finish.
    async fn close(&self);
}

/// Shared session handle.
pub type SessionRef = Arc<dyn Session>;

/// Session acquired by a connector.
#[derive(Clone)]
pub struct Attachment {
    pub session: SessionRef,
    /// `true` when the runner that acquired the session is responsible for closing it.
    pub owned: bool,
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("address", &self.session.address())
            .field("owned", &self.owned)
            .finish()
    }
}

/// Strategy for acquiring a session from a runner configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connector name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Returns `true` if this connector handles the given address.
    ///
    /// `None` means no address was configured.
    fn supports(&self, address: Option<&str>) -> bool;

    /// Acquire a session.
    async fn connect(&self, config: &RunnerConfig) -> Result<Attachment, SubstrateError>;
}
