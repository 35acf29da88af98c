use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::state::TaskFailure;

/// Resolved keyword arguments handed to a task callable.
///
/// By the time a callable sees `Args`, every upstream future has already been replaced by its value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(Map<String, Value>);

impl Args {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert an argument, replacing any previous value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Builder-style [`Args::insert`].
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get_raw(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Deserialize a named argument.
    ///
    /// Missing or mistyped arguments are reported as a `Raised` failure so a callable can use `?`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, TaskFailure> {
        let raw = self
            .0
            .get(name)
            .ok_or_else(|| TaskFailure::raised(format!("missing argument '{name}'")))?;
        serde_json::from_value(raw.clone())
            .map_err(|e| TaskFailure::raised(format!("invalid argument '{name}': {e}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailureKind;
    use serde_json::json;

    #[test]
    fn typed_get_deserializes() {
        let args = Args::new().with("seconds", json!(5)).with("label", json!("x"));
        assert_eq!(args.get::<u64>("seconds").unwrap(), 5);
        assert_eq!(args.get::<String>("label").unwrap(), "x");
    }

    #[test]
    fn missing_argument_is_a_raised_failure() {
        let err = Args::new().get::<u64>("nope").unwrap_err();
        assert_eq!(err.kind, FailureKind::Raised);
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn mistyped_argument_is_reported() {
        let args = Args::new().with("n", json!("five"));
        let err = args.get::<u64>("n").unwrap_err();
        assert!(err.message.starts_with("invalid argument 'n'"));
    }
}
