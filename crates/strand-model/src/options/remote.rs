use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Labels;

/// Per-call remote execution overlay.
///
/// Resource hints and retry overrides applied to every submission issued inside
/// an options scope. Unset fields fall through to the enclosing scope.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_cpus: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_gpus: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    /// Overrides the task's own retry count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Maximum number of calls a worker may serve before being recycled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_calls: Option<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl RemoteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_num_cpus(mut self, n: f64) -> Self {
        self.num_cpus = Some(n);
        self
    }

    pub fn with_num_gpus(mut self, n: f64) -> Self {
        self.num_gpus = Some(n);
        self
    }

    pub fn with_memory_bytes(mut self, n: u64) -> Self {
        self.memory_bytes = Some(n);
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn with_max_calls(mut self, n: u32) -> Self {
        self.max_calls = Some(n);
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, amount: f64) -> Self {
        self.resources.insert(name.into(), amount);
        self
    }

    /// Attach a label; substrates record labels on the span of every call.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key, value);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Layer `inner` on top of `self`: every field set in `inner` wins.
    pub fn merged(&self, inner: &RemoteOptions) -> RemoteOptions {
        let mut resources = self.resources.clone();
        resources.extend(inner.resources.iter().map(|(k, v)| (k.clone(), *v)));
        let mut extra = self.extra.clone();
        extra.extend(inner.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

        RemoteOptions {
            num_cpus: inner.num_cpus.or(self.num_cpus),
            num_gpus: inner.num_gpus.or(self.num_gpus),
            memory_bytes: inner.memory_bytes.or(self.memory_bytes),
            max_retries: inner.max_retries.or(self.max_retries),
            max_calls: inner.max_calls.or(self.max_calls),
            resources,
            labels: self.labels.merged(&inner.labels),
            extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inner_fields_override_outer() {
        let outer = RemoteOptions::new()
            .with_num_cpus(2.0)
            .with_max_retries(1)
            .with_resource("tpu", 1.0);
        let inner = RemoteOptions::new().with_max_retries(3).with_resource("tpu", 2.0);

        let merged = outer.merged(&inner);
        assert_eq!(merged.num_cpus, Some(2.0));
        assert_eq!(merged.max_retries, Some(3));
        assert_eq!(merged.resources.get("tpu"), Some(&2.0));
    }

    #[test]
    fn labels_merge_per_key() {
        let outer = RemoteOptions::new().with_label("team", "ml").with_label("zone", "a");
        let inner = RemoteOptions::new().with_label("zone", "b");

        let merged = outer.merged(&inner);
        assert_eq!(merged.labels.get("team"), Some("ml"));
        assert_eq!(merged.labels.get("zone"), Some("b"));
        assert_eq!(
            serde_json::to_value(&inner).unwrap(),
            json!({"labels": {"zone": "b"}})
        );
    }

    #[test]
    fn empty_overlay_is_identity() {
        let outer = RemoteOptions::new().with_max_calls(1);
        assert_eq!(outer.merged(&RemoteOptions::new()), outer);
        assert!(RemoteOptions::new().is_empty());
    }

    #[test]
    fn serializes_only_set_fields() {
        let opts = RemoteOptions::new().with_max_calls(1);
        assert_eq!(serde_json::to_value(&opts).unwrap(), json!({"maxCalls": 1}));
    }
}
