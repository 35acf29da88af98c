use serde::{Deserialize, Serialize};

use super::BackoffStrategy;

/// How many times a failed invocation is re-dispatched.
///
/// Only `Failed` outcomes (raised errors, panics, timeouts) are retried.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryStrategy {
    pub retries: u32,
    pub backoff: BackoffStrategy,
}

impl RetryStrategy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: BackoffStrategy::immediate(),
        }
    }

    pub fn new(retries: u32, backoff: BackoffStrategy) -> Self {
        Self { retries, backoff }
    }
}
