use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("duplicate task detected: task '{name}' is already registered")]
    DuplicateTask { name: String },

    #[error("in-process cluster '{name}' is already running")]
    ClusterExists { name: String },

    #[error("invalid cluster configuration: {0}")]
    InvalidConfig(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
