//! Worker side of the protocol.
use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Semaphore, mpsc},
};
use tokio_util::{
    codec::{Framed, LinesCodec},
    sync::CancellationToken,
};
use tracing::{debug, info, instrument, trace, warn};

use strand_core::substrate::{CallId, RemoteCall, SubstrateError};
use strand_model::{Args, Envelope, InitOptions, RemoteOptions, RunId, TaskFailure};

use super::protocol::{Frame, PROTOCOL_VERSION, codec};
use crate::{ExecError, cluster::LocalCluster, registry::TaskRegistry};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Conn = Framed<TcpStream, LinesCodec>;

async fn send(conn: &mut Conn, frame: Frame) -> Result<(), ExecError> {
    let line = frame.encode()?;
    conn.send(line)
        .await
        .map_err(|e| ExecError::Protocol(format!("write failed: {e}")))
}

/// Serves registered tasks to remote runners on a local cluster.
///
/// Of the init options a client sends in `hello`, only `num_workers` is honoured:
/// it caps how many of that connection's calls run at once, and the `welcome`
/// reply reports the resulting capacity. Other keys are logged and ignored.
#[derive(Clone, Debug)]
pub struct WorkerServer {
    name: String,
    registry: Arc<TaskRegistry>,
    cluster: LocalCluster,
}

struct Submission {
    run_id: RunId,
    task: String,
    args: Args,
    options: RemoteOptions,
    attempt: u32,
}

impl WorkerServer {
    pub fn new(name: impl Into<String>, registry: TaskRegistry, cluster: LocalCluster) -> Self {
        Self {
            name: name.into(),
            registry: Arc::new(registry),
            cluster,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster(&self) -> &LocalCluster {
        &self.cluster
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Each connection runs independently; its calls are cancelled when it disconnects.
    #[instrument(level = "info", skip_all, fields(worker = %self.name))]
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<(), ExecError> {
        info!(addr = ?listener.local_addr().ok(), tasks = ?self.registry.names(), "worker server listening");
        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted?,
            };
            debug!(%peer, "client connected");
            let server = self.clone();
            let conn_cancel = shutdown.child_token();
            tokio::spawn(async move {
                match server.handle(stream, conn_cancel).await {
                    Ok(()) => debug!(%peer, "client disconnected"),
                    Err(e) => warn!(%peer, error = %e, "client connection failed"),
                }
            });
        }
        info!("worker server stopped");
        Ok(())
    }

    /// Calls a connection may run at once.
    fn connection_capacity(&self, options: &InitOptions) -> u32 {
        let capacity = self.cluster.capacity();
        options
            .num_workers()
            .and_then(|n| u32::try_from(n).ok())
            .map_or(capacity, |n| n.min(capacity))
    }

    /// Returns the connection capacity, or `None` if the client was turned away.
    async fn handshake(&self, conn: &mut Conn) -> Result<Option<u32>, ExecError> {
        let first = tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.next())
            .await
            .map_err(|_| ExecError::Protocol("handshake timed out".into()))?;
        let line = match first {
            Some(line) => line.map_err(|e| ExecError::Protocol(e.to_string()))?,
            None => return Ok(None),
        };
        let mut accepted = None;
        let reply = match Frame::decode(&line)? {
            Frame::Hello { protocol, options } if protocol == PROTOCOL_VERSION => {
                let capacity = self.connection_capacity(&options);
                trace!(options = ?options, capacity, "client init options");
                accepted = Some(capacity);
                Frame::Welcome {
                    worker: self.name.clone(),
                    capacity,
                }
            }
            Frame::Hello { protocol, .. } => Frame::Error {
                message: format!("unsupported protocol version {protocol}"),
            },
            other => Frame::Error {
                message: format!("expected hello, got {}", other.kind()),
            },
        };
        send(conn, reply).await?;
        Ok(accepted)
    }

    async fn handle(&self, stream: TcpStream, cancel: CancellationToken) -> Result<(), ExecError> {
        let _ = stream.set_nodelay(true);
        let mut conn = Framed::new(stream, codec());
        let Some(capacity) = self.handshake(&mut conn).await? else {
            return Ok(());
        };
        let limit = Arc::new(Semaphore::new(capacity as usize));

        let (outcomes, mut finished) = mpsc::unbounded_channel::<(CallId, Envelope)>();
        let mut runs: HashMap<CallId, CancellationToken> = HashMap::new();
        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                Some((id, envelope)) = finished.recv() => {
                    runs.remove(&id);
                    let frame = Frame::Outcome {
                        run_id: id.run_id,
                        attempt: id.attempt,
                        envelope,
                    };
                    if let Err(e) = send(&mut conn, frame).await {
                        break Err(e);
                    }
                }
                line = conn.next() => {
                    let line = match line {
                        None => break Ok(()),
                        Some(Err(e)) => break Err(ExecError::Protocol(e.to_string())),
                        Some(Ok(line)) => line,
                    };
                    match Frame::decode(&line) {
                        Ok(Frame::Submit { run_id, task, args, options, attempt }) => {
                            let id = CallId { run_id, attempt };
                            let submission = Submission { run_id, task, args, options, attempt };
                            if let Some(token) = self.start(submission, &cancel, &limit, &outcomes) {
                                runs.insert(id, token);
                            }
                        }
                        Ok(Frame::Cancel { run_id, attempt }) => {
                            let id = CallId { run_id, attempt };
                            if let Some(token) = runs.get(&id) {
                                trace!(call = %id, "client cancelled call");
                                token.cancel();
                            }
                        }
                        Ok(other) => debug!(frame = other.kind(), "unexpected frame from client"),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        if !runs.is_empty() {
            debug!(runs = runs.len(), "cancelling runs of closed connection");
        }
        cancel.cancel();
        result
    }

    fn start(
        &self,
        submission: Submission,
        conn_cancel: &CancellationToken,
        limit: &Arc<Semaphore>,
        outcomes: &mpsc::UnboundedSender<(CallId, Envelope)>,
    ) -> Option<CancellationToken> {
        let Submission {
            run_id,
            task,
            args,
            options,
            attempt,
        } = submission;
        let id = CallId { run_id, attempt };

        let Some(task) = self.registry.get(&task).cloned() else {
            let failure = TaskFailure::raised(format!("unknown task '{task}'"));
            let _ = outcomes.send((id, Envelope::Err { failure }));
            return None;
        };

        let token = conn_cancel.child_token();
        let call = RemoteCall {
            run_id,
            task,
            args,
            options,
            attempt,
        };
        let cluster = self.cluster.clone();
        let limit = Arc::clone(limit);
        let outcomes = outcomes.clone();
        let cancel = token.clone();
        tokio::spawn(async move {
            let permit = tokio::select! {
                permit = limit.acquire_owned() => permit.ok(),
                _ = cancel.cancelled() => None,
            };
            let outcome = if permit.is_none() {
                Err(SubstrateError::Cancelled("call cancelled by client".into()))
            } else {
                match cluster.execute_with(call, cancel) {
                    Ok(mut handle) => handle.join().await,
                    Err(e) => Err(e),
                }
            };
            drop(permit);
            let envelope = match outcome {
                Ok(value) => Envelope::Ok { value },
                Err(e) => Envelope::Err {
                    failure: e.into_failure(),
                },
            };
            let _ = outcomes.send((id, envelope));
        });
        Some(token)
    }
}
