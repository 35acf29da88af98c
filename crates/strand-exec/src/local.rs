//! Sessions backed by a [`LocalCluster`] in this process.
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use strand_core::{
    RunnerConfig,
    substrate::{Attachment, Connector, RemoteCall, RemoteHandle, Session, SubstrateError},
};

use crate::{cluster::LocalCluster, metrics::SUBSTRATE_LOCAL};

/// Session over a local cluster.
///
/// Closing the session cancels the calls it dispatched; the cluster itself is shut
/// down only when the session owns it.
pub struct LocalSession {
    address: String,
    cluster: LocalCluster,
    owns_cluster: bool,
    closed: CancellationToken,
}

impl LocalSession {
    pub fn new(address: impl Into<String>, cluster: LocalCluster, owns_cluster: bool) -> Self {
        Self {
            address: address.into(),
            cluster,
            owns_cluster,
            closed: CancellationToken::new(),
        }
    }

    pub fn cluster(&self) -> &LocalCluster {
        &self.cluster
    }
}

#[async_trait]
impl Session for LocalSession {
    fn address(&self) -> &str {
        &self.address
    }

    async fn dispatch(&self, call: RemoteCall) -> Result<RemoteHandle, SubstrateError> {
        if self.closed.is_cancelled() {
            return Err(SubstrateError::SessionClosed);
        }
        self.cluster.execute_with(call, self.closed.child_token())
    }

    async fn close(&self) {
        self.closed.cancel();
        if self.owns_cluster {
            self.cluster.shutdown();
        }
        debug!(address = %self.address, "local session closed");
    }
}

/// Starts a private cluster when no address is configured.
///
/// The pool is sized from the `num_workers` init option, falling back to the
/// host's available parallelism.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalConnector;

#[async_trait]
impl Connector for LocalConnector {
    fn name(&self) -> &'static str {
        SUBSTRATE_LOCAL
    }

    fn supports(&self, address: Option<&str>) -> bool {
        address.is_none()
    }

    async fn connect(&self, config: &RunnerConfig) -> Result<Attachment, SubstrateError> {
        let cluster = match config.init_options().num_workers() {
            Some(n) => LocalCluster::new(SUBSTRATE_LOCAL, n),
            None => LocalCluster::with_default_size(SUBSTRATE_LOCAL),
        }
        .map_err(|e| SubstrateError::Connect {
            address: SUBSTRATE_LOCAL.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Attachment {
            session: Arc::new(LocalSession::new(SUBSTRATE_LOCAL, cluster, true)),
            owned: true,
        })
    }
}
