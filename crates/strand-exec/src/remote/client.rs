//! Client side of the worker protocol.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, info, trace, warn};

use strand_core::{
    RunnerConfig,
    substrate::{
        Attachment, CallId, Connector, RemoteCall, RemoteHandle, RemoteOutcome, Session, SubstrateError,
    },
};
use strand_model::InitOptions;

use super::protocol::{Frame, PROTOCOL_VERSION, codec};
use crate::metrics::SUBSTRATE_REMOTE;

/// Address scheme of worker processes.
pub const TCP_SCHEME: &str = "tcp://";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

struct Pending {
    reply: oneshot::Sender<RemoteOutcome>,
    done: CancellationToken,
}

type PendingMap = Arc<Mutex<HashMap<CallId, Pending>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<CallId, Pending>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fail_all(pending: &PendingMap, reason: &str) {
    let drained: Vec<_> = lock(pending).drain().collect();
    if !drained.is_empty() {
        warn!(pending = drained.len(), reason, "failing calls still pending on worker");
    }
    for (_, p) in drained {
        p.done.cancel();
        let _ = p.reply.send(Err(SubstrateError::WorkerLost(reason.to_string())));
    }
}

/// Connection to a worker process.
///
/// Closing the session drops the connection; the worker keeps running.
pub struct RemoteSession {
    address: String,
    worker: String,
    capacity: u32,
    outgoing: mpsc::UnboundedSender<Frame>,
    pending: PendingMap,
    closed: CancellationToken,
}

impl RemoteSession {
    /// Connect and perform the handshake.
    pub async fn connect(
        address: &str,
        options: &InitOptions,
    ) -> Result<Self, SubstrateError> {
        let target = address.trim_start_matches(TCP_SCHEME);
        let connect_err = |reason: String| SubstrateError::Connect {
            address: address.to_string(),
            reason,
        };

        let stream = tokio::time::timeout(HANDSHAKE_TIMEOUT, TcpStream::connect(target))
            .await
            .map_err(|_| connect_err("connect timed out".into()))?
            .map_err(|e| connect_err(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        let mut framed = Framed::new(stream, codec());

        let hello = Frame::Hello {
            protocol: PROTOCOL_VERSION,
            options: options.clone(),
        };
        let line = hello.encode().map_err(|e| connect_err(e.to_string()))?;
        framed
            .send(line)
            .await
            .map_err(|e| connect_err(e.to_string()))?;

        let reply = tokio::time::timeout(HANDSHAKE_TIMEOUT, framed.next())
            .await
            .map_err(|_| connect_err("handshake timed out".into()))?
            .ok_or_else(|| connect_err("worker closed the connection".into()))?
            .map_err(|e| connect_err(e.to_string()))?;
        let (worker, capacity) = match Frame::decode(&reply).map_err(|e| connect_err(e.to_string()))? {
            Frame::Welcome { worker, capacity } => (worker, capacity),
            Frame::Error { message } => return Err(connect_err(message)),
            other => {
                return Err(connect_err(format!(
                    "expected welcome, got {}",
                    other.kind()
                )));
            }
        };

        let (outgoing, mut outbox) = mpsc::unbounded_channel::<Frame>();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = CancellationToken::new();
        let (mut sink, mut stream) = framed.split();

        let writer_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = writer_closed.cancelled() => break,
                    frame = outbox.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                let line = match frame.encode() {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "dropping unencodable frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(line).await {
                    debug!(error = %e, "worker connection write failed");
                    writer_closed.cancel();
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_pending = Arc::clone(&pending);
        let reader_closed = closed.clone();
        let peer = address.to_string();
        tokio::spawn(async move {
            let reason = loop {
                let line = tokio::select! {
                    _ = reader_closed.cancelled() => break "session closed".to_string(),
                    line = stream.next() => line,
                };
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => break format!("connection error: {e}"),
                    None => break "worker closed the connection".to_string(),
                };
                match Frame::decode(&line) {
                    Ok(Frame::Outcome { run_id, attempt, envelope }) => {
                        let id = CallId { run_id, attempt };
                        let entry = lock(&reader_pending).remove(&id);
                        match entry {
                            Some(p) => {
                                p.done.cancel();
                                let _ = p.reply.send(envelope.into_result().map_err(SubstrateError::Task));
                            }
                            None => trace!(call = %id, "outcome for unknown call ignored"),
                        }
                    }
                    Ok(other) => debug!(frame = other.kind(), "unexpected frame from worker"),
                    Err(e) => break e.to_string(),
                }
            };
            reader_closed.cancel();
            fail_all(&reader_pending, &reason);
            info!(worker = %peer, reason = %reason, "worker connection ended");
        });

        info!(address, worker = %worker, capacity, "connected to worker");
        Ok(Self {
            address: address.to_string(),
            worker,
            capacity,
            outgoing,
            pending,
            closed,
        })
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[async_trait]
impl Session for RemoteSession {
    fn address(&self) -> &str {
        &self.address
    }

    async fn dispatch(&self, call: RemoteCall) -> Result<RemoteHandle, SubstrateError> {
        if self.closed.is_cancelled() {
            return Err(SubstrateError::SessionClosed);
        }
        let id = call.id();
        let run_id = id.run_id;
        let (reply, rx) = oneshot::channel();
        let done = CancellationToken::new();
        {
            let mut pending = lock(&self.pending);
            if pending.contains_key(&id) {
                return Err(SubstrateError::Rejected(format!(
                    "call {id} is already pending"
                )));
            }
            pending.insert(
                id,
                Pending {
                    reply,
                    done: done.clone(),
                },
            );
        }

        let frame = Frame::Submit {
            run_id,
            task: call.task.name().to_string(),
            args: call.args,
            options: call.options,
            attempt: call.attempt,
        };
        if self.outgoing.send(frame).is_err() {
            lock(&self.pending).remove(&id);
            return Err(SubstrateError::SessionClosed);
        }

        let cancel = CancellationToken::new();
        let watch = cancel.clone();
        let outgoing = self.outgoing.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = watch.cancelled() => {
                    trace!(call = %id, "forwarding cancel to worker");
                    let _ = outgoing.send(Frame::Cancel {
                        run_id: id.run_id,
                        attempt: id.attempt,
                    });
                }
                _ = done.cancelled() => {}
                _ = closed.cancelled() => {}
            }
        });
        Ok(RemoteHandle::new(run_id, rx, cancel))
    }

    async fn close(&self) {
        self.closed.cancel();
        fail_all(&self.pending, "session closed");
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Attaches runners to a worker reachable over TCP.
///
/// Accepts `tcp://host:port` and bare `host:port` addresses. The session is owned
/// by the runner; closing it only drops the connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteConnector;

#[async_trait]
impl Connector for RemoteConnector {
    fn name(&self) -> &'static str {
        SUBSTRATE_REMOTE
    }

    fn supports(&self, address: Option<&str>) -> bool {
        match address {
            Some(a) if a.starts_with(TCP_SCHEME) => true,
            Some(a) => !a.contains("://") && a.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()),
            None => false,
        }
    }

    async fn connect(&self, config: &RunnerConfig) -> Result<Attachment, SubstrateError> {
        let address = config.address().unwrap_or_default();
        let session = RemoteSession::connect(address, config.init_options()).await?;
        Ok(Attachment {
            session: Arc::new(session),
            owned: true,
        })
    }
}
