use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Free-form string metadata attached to remote calls.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(pub BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert or overwrite a label.
    pub fn insert<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.insert(key.into(), val.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    /// Return a copy where entries from `other` win on key collision.
    pub fn merged(&self, other: &Labels) -> Labels {
        let mut out = self.0.clone();
        out.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Labels(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// `key=value` pairs joined by commas, in key order.
impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Labels;

    #[test]
    fn displays_sorted_pairs() {
        let mut labels = Labels::new();
        labels.insert("zone", "b").insert("team", "ml");
        assert_eq!(labels.to_string(), "team=ml,zone=b");
        assert_eq!(Labels::new().to_string(), "");
    }

    #[test]
    fn merged_prefers_other() {
        let mut base = Labels::new();
        base.insert("zone", "a").insert("tier", "gold");
        let mut over = Labels::new();
        over.insert("zone", "b");

        let merged = base.merged(&over);
        assert_eq!(merged.get("zone"), Some("b"));
        assert_eq!(merged.get("tier"), Some("gold"));
    }
}
