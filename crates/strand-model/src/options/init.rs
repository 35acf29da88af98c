use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key used by local clusters to size their worker pool.
pub const NUM_WORKERS_KEY: &str = "num_workers";

/// Backend initialization bundle.
///
/// Forwarded verbatim to the substrate when a session is acquired; the runner
/// itself only reads [`NUM_WORKERS_KEY`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InitOptions(BTreeMap<String, Value>);

impl InitOptions {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Requested worker count, if present and a positive integer.
    pub fn num_workers(&self) -> Option<usize> {
        self.0
            .get(NUM_WORKERS_KEY)
            .and_then(Value::as_u64)
            .filter(|n| *n > 0)
            .map(|n| n as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}
