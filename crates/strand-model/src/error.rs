use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid run id: {0}")]
    InvalidRunId(String),

    #[error("unknown failure kind: {0}")]
    UnknownFailureKind(String),

    #[error("unknown state kind: {0}")]
    UnknownStateKind(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
