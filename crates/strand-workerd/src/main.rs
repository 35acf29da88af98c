mod builtins;
mod cli;

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use taskvisor::{
    BackoffPolicy, SupervisorConfig, JitterPolicy, RestartPolicy, Subscribe, Supervisor,
    TaskError, TaskFn, TaskRef, TaskSpec,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use strand_exec::{LocalCluster, WorkerServer};
use strand_observe::{LoggerConfig, SupervisorEvents, init_local_offset, init_logger};

use crate::cli::Cli;

fn main() -> anyhow::Result<()> {
    // Must run before the runtime starts any thread.
    init_local_offset();

    let cli = Cli::parse();
    let cfg = LoggerConfig::default()
        .with_level(cli.log_level.clone())
        .with_format(cli.log_format);
    init_logger(&cfg)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cluster = match cli.workers {
        Some(n) => LocalCluster::new("workerd", n)?,
        None => LocalCluster::with_default_size("workerd")?,
    };
    let server = WorkerServer::new(hostname(), builtins::registry()?, cluster.clone());
    info!(listen = %cli.listen, capacity = cluster.capacity(), "worker starting");

    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(SupervisorEvents)];
    let sup = Supervisor::builder(SupervisorConfig::default())
        .with_subscribers(subscribers)
        .build();

    let res = sup.run(vec![server_spec(server, cli.listen)]).await;
    cluster.shutdown();
    res.map_err(|e| anyhow::anyhow!("supervisor exited with error: {e}"))?;

    info!("worker stopped");
    Ok(())
}

/// Supervised TCP server; rebinds after a failure.
fn server_spec(server: WorkerServer, listen: String) -> TaskSpec {
    let task: TaskRef = TaskFn::arc("strand-worker-server", move |cancel: CancellationToken| {
        let server = server.clone();
        let listen = listen.clone();
        async move {
            let listener = TcpListener::bind(&listen).await.map_err(|e| TaskError::Fail {
                reason: format!("failed to bind {listen}: {e}"),
            })?;
            server
                .serve(listener, cancel)
                .await
                .map_err(|e| TaskError::Fail {
                    reason: e.to_string(),
                })
        }
    });

    let backoff = BackoffPolicy {
        jitter: JitterPolicy::Equal,
        factor: 2.0,
        first: Duration::from_millis(500),
        max: Duration::from_secs(30),
    };
    TaskSpec::new(task, RestartPolicy::OnFailure, backoff, None)
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "strand-workerd".to_string())
}
