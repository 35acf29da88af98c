mod domain;
pub use domain::{Args, Labels, RunId};

mod error;
pub use error::{ModelError, ModelResult};

mod envelope;
pub use envelope::Envelope;

mod options;
pub use options::{InitOptions, RemoteOptions};

mod state;
pub use state::{FailureKind, State, StateData, StateKind, TaskError, TaskFailure};

mod strategy;
pub use strategy::{BackoffStrategy, CrashPolicy, RetryStrategy};
