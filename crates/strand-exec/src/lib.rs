//! Compute substrates for `strand-core` runners.
//!
//! Three connection modes share one dispatch path through [`LocalCluster`]:
//! an ephemeral cluster owned by the runner ([`LocalConnector`]), a named cluster
//! shared inside the process ([`InProcessConnector`]) and a worker process reached
//! over TCP ([`RemoteConnector`]).
mod error;
pub use error::ExecError;

mod metrics;
pub use metrics::{SUBSTRATE_INPROC, SUBSTRATE_LOCAL, SUBSTRATE_REMOTE};

mod cluster;
pub use cluster::LocalCluster;

mod registry;
pub use registry::TaskRegistry;

mod local;
pub use local::{LocalConnector, LocalSession};

mod inproc;
pub use inproc::{INPROC_SCHEME, InProcessCluster, InProcessConnector};

#[cfg(feature = "remote")]
pub mod remote;
#[cfg(feature = "remote")]
pub use remote::{RemoteConnector, WorkerServer};

use std::sync::Arc;

use strand_core::router::ConnectorRouter;

/// Register the ephemeral local connector.
///
/// After this call, runners without an address start a private [`LocalCluster`].
pub fn register_local_connector(router: &mut ConnectorRouter) {
    router.register(Arc::new(LocalConnector));
}

/// Register the `inproc://` connector.
pub fn register_inproc_connector(router: &mut ConnectorRouter) {
    router.register(Arc::new(InProcessConnector));
}

/// Register the TCP connector for `tcp://host:port` and `host:port` addresses.
#[cfg(feature = "remote")]
pub fn register_remote_connector(router: &mut ConnectorRouter) {
    router.register(Arc::new(RemoteConnector));
}

/// Router with every built-in connector registered.
pub fn default_router() -> ConnectorRouter {
    let mut router = ConnectorRouter::new();
    register_local_connector(&mut router);
    register_inproc_connector(&mut router);
    #[cfg(feature = "remote")]
    register_remote_connector(&mut router);
    router
}
