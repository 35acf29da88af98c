pub mod completion;
pub mod context;
pub mod error;
pub mod future;
pub mod metrics;
pub mod params;
pub mod resolver;
pub mod router;
pub mod runner;
pub mod substrate;
pub mod task;

pub use completion::{AsCompleted, AsCompletedStream, as_completed, as_completed_stream};
pub use context::{current_remote_options, remote_options, with_remote_options};
pub use error::CoreError;
pub use future::TaskFuture;
pub use metrics::TaskOutcome;
pub use params::{Gathered, Param, Parameters};
pub use runner::{RunnerConfig, RunnerContext, TaskRunner};
pub use task::{Callable, Task, TaskResult};

pub mod prelude {
    pub use crate::completion::{as_completed, as_completed_stream};
    pub use crate::context::{remote_options, with_remote_options};
    pub use crate::error::CoreError;
    pub use crate::future::TaskFuture;
    pub use crate::params::{Param, Parameters};
    pub use crate::router::ConnectorRouter;
    pub use crate::runner::{RunnerConfig, RunnerContext, TaskRunner};
    pub use crate::substrate::{Connector, Session};
    pub use crate::task::Task;
}
