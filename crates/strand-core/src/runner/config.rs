use serde::{Deserialize, Serialize};

use strand_model::{CrashPolicy, InitOptions};

/// Runner configuration.
///
/// Two runners with equal configuration are considered equal; see [`super::TaskRunner::duplicate`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Substrate address. `None` starts an ephemeral session owned by the runner.
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    /// Forwarded verbatim to the substrate on connect.
    init_options: InitOptions,
    /// Failure kinds reported as CRASHED.
    crash: CrashPolicy,
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the substrate address; an empty string means ephemeral.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        let trimmed = address.trim();
        self.address = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn with_init_options(mut self, init_options: InitOptions) -> Self {
        self.init_options = init_options;
        self
    }

    pub fn with_crash_policy(mut self, crash: CrashPolicy) -> Self {
        self.crash = crash;
        self
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn init_options(&self) -> &InitOptions {
        &self.init_options
    }

    pub fn crash_policy(&self) -> &CrashPolicy {
        &self.crash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_address_means_ephemeral() {
        assert_eq!(RunnerConfig::new().with_address("  ").address(), None);
        assert_eq!(
            RunnerConfig::new().with_address("tcp://h:1").address(),
            Some("tcp://h:1")
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: RunnerConfig = serde_json::from_value(json!({
            "address": "inproc://test",
            "initOptions": { "num_workers": 2 }
        }))
        .unwrap();
        assert_eq!(cfg.address(), Some("inproc://test"));
        assert_eq!(cfg.init_options().num_workers(), Some(2));
        assert_eq!(cfg.crash_policy(), &CrashPolicy::default());
    }
}
