use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::TaskFailure;

/// Result of a call as it crosses the substrate boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Envelope {
    Ok { value: Value },
    Err { failure: TaskFailure },
}

impl Envelope {
    pub fn into_result(self) -> Result<Value, TaskFailure> {
        match self {
            Envelope::Ok { value } => Ok(value),
            Envelope::Err { failure } => Err(failure),
        }
    }
}

impl From<Result<Value, TaskFailure>> for Envelope {
    fn from(r: Result<Value, TaskFailure>) -> Self {
        match r {
            Ok(value) => Envelope::Ok { value },
            Err(failure) => Envelope::Err { failure },
        }
    }
}
