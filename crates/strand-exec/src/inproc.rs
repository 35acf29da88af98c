//! Named clusters shared by every runner in the process.
//!
//! An [`InProcessCluster`] registers itself under `inproc://<name>`. Runners attach
//! through [`InProcessConnector`] without owning the cluster; dropping the
//! `InProcessCluster` shuts it down.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
};

use async_trait::async_trait;

use strand_core::{
    RunnerConfig,
    substrate::{Attachment, Connector, SubstrateError},
};

use crate::{ExecError, cluster::LocalCluster, local::LocalSession, metrics::SUBSTRATE_INPROC};

/// Address scheme of in-process clusters.
pub const INPROC_SCHEME: &str = "inproc://";

fn directory() -> MutexGuard<'static, HashMap<String, LocalCluster>> {
    static DIRECTORY: OnceLock<Mutex<HashMap<String, LocalCluster>>> = OnceLock::new();
    DIRECTORY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Owner of a named in-process cluster.
#[derive(Debug)]
pub struct InProcessCluster {
    name: String,
    cluster: LocalCluster,
}

impl InProcessCluster {
    /// Start a cluster with `workers` slots under `name`.
    pub fn start(name: impl Into<String>, workers: usize) -> Result<Self, ExecError> {
        let name = name.into();
        let mut dir = directory();
        if dir.contains_key(&name) {
            return Err(ExecError::ClusterExists { name });
        }
        let cluster = LocalCluster::new(format!("{INPROC_SCHEME}{name}"), workers)?;
        dir.insert(name.clone(), cluster.clone());
        Ok(Self { name, cluster })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address runners use to attach.
    pub fn address(&self) -> String {
        format!("{INPROC_SCHEME}{}", self.name)
    }

    pub fn cluster(&self) -> &LocalCluster {
        &self.cluster
    }
}

impl Drop for InProcessCluster {
    fn drop(&mut self) {
        directory().remove(&self.name);
        self.cluster.shutdown();
    }
}

/// Attaches runners to a registered [`InProcessCluster`].
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessConnector;

#[async_trait]
impl Connector for InProcessConnector {
    fn name(&self) -> &'static str {
        SUBSTRATE_INPROC
    }

    fn supports(&self, address: Option<&str>) -> bool {
        address.is_some_and(|a| a.starts_with(INPROC_SCHEME))
    }

    async fn connect(&self, config: &RunnerConfig) -> Result<Attachment, SubstrateError> {
        let address = config.address().unwrap_or_default();
        let name = address.trim_start_matches(INPROC_SCHEME);
        let cluster = directory()
            .get(name)
            .cloned()
            .ok_or_else(|| SubstrateError::Connect {
                address: address.to_string(),
                reason: "no in-process cluster with this name".into(),
            })?;

        Ok(Attachment {
            session: Arc::new(LocalSession::new(address, cluster, false)),
            owned: false,
        })
    }
}
