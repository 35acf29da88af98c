use thiserror::Error;

use strand_model::RunId;

use crate::substrate::SubstrateError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("task runner is not started; call start() before submitting")]
    RunnerNotReady,

    #[error("task runner is already started")]
    AlreadyStarted,

    #[error("no connector supports address: {0}")]
    NoConnector(String),

    #[error("substrate error: {0}")]
    Substrate(#[from] SubstrateError),

    #[error("run {0} is already in flight")]
    DuplicateRun(RunId),

    #[error("timed out waiting for {} outstanding future(s)", outstanding.len())]
    CompletionWaitTimedOut { outstanding: Vec<RunId> },
}
