//! Call parameters that may embed other runs' futures.
use serde::Serialize;
use serde_json::Value;

use strand_model::{Args, RunId, State};

use crate::future::TaskFuture;

/// Single parameter value.
#[derive(Clone, Debug)]
pub enum Param {
    Value(Value),
    /// Output of another run; an implicit dependency.
    Future(TaskFuture),
    List(Vec<Param>),
}

/// A [`Param`] with every future replaced by its final state.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Gathered {
    Value(Value),
    State(State),
    List(Vec<Gathered>),
}

impl Gathered {
    /// Returns the completed value, if this is a completed state or a plain value.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Gathered::Value(v) => Some(v),
            Gathered::State(s) => s.data().as_value(),
            Gathered::List(_) => None,
        }
    }

    pub fn as_state(&self) -> Option<&State> {
        match self {
            Gathered::State(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Gathered]> {
        match self {
            Gathered::List(items) => Some(items),
            _ => None,
        }
    }
}

impl Param {
    fn collect_upstreams(&self, out: &mut Vec<TaskFuture>) {
        match self {
            Param::Value(_) => {}
            Param::Future(f) => out.push(f.clone()),
            Param::List(items) => items.iter().for_each(|p| p.collect_upstreams(out)),
        }
    }

    /// Futures embedded in this parameter, depth-first.
    pub fn upstreams(&self) -> Vec<TaskFuture> {
        let mut out = Vec::new();
        self.collect_upstreams(&mut out);
        out
    }

    /// Replace every embedded future by its completed value.
    ///
    /// Fails with the run id of the first future that is not completed.
    pub(crate) fn resolve(&self) -> Result<Value, RunId> {
        match self {
            Param::Value(v) => Ok(v.clone()),
            Param::Future(f) => f.state().data().as_value().cloned().ok_or(f.run_id()),
            Param::List(items) => items
                .iter()
                .map(Param::resolve)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }

    fn snapshot(&self) -> Gathered {
        match self {
            Param::Value(v) => Gathered::Value(v.clone()),
            Param::Future(f) => Gathered::State(f.state()),
            Param::List(items) => Gathered::List(items.iter().map(Param::snapshot).collect()),
        }
    }

    /// Block until every embedded future is final and return the same shape with states in place.
    pub fn gather(&self) -> Gathered {
        for f in self.upstreams() {
            f.wait(None);
        }
        self.snapshot()
    }

    /// Async form of [`Param::gather`].
    pub async fn gather_async(&self) -> Gathered {
        for f in self.upstreams() {
            f.wait_async(None).await;
        }
        self.snapshot()
    }
}

impl From<Value> for Param {
    fn from(v: Value) -> Self {
        Param::Value(v)
    }
}

impl From<TaskFuture> for Param {
    fn from(f: TaskFuture) -> Self {
        Param::Future(f)
    }
}

impl From<&TaskFuture> for Param {
    fn from(f: &TaskFuture) -> Self {
        Param::Future(f.clone())
    }
}

impl<T: Into<Param>> From<Vec<T>> for Param {
    fn from(items: Vec<T>) -> Self {
        Param::List(items.into_iter().map(Into::into).collect())
    }
}

/// Ordered keyword parameters for a submission.
#[derive(Clone, Debug, Default)]
pub struct Parameters {
    items: Vec<(String, Param)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`; a later value for the same name replaces the earlier one in place.
    pub fn insert(&mut self, name: impl Into<String>, param: impl Into<Param>) {
        let name = name.into();
        let param = param.into();
        match self.items.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = param,
            None => self.items.push((name, param)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, param: impl Into<Param>) -> Self {
        self.insert(name, param);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.items.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.items.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// Every future embedded in any parameter, in parameter order.
    pub fn upstreams(&self) -> Vec<TaskFuture> {
        let mut out = Vec::new();
        for (_, p) in &self.items {
            p.collect_upstreams(&mut out);
        }
        out
    }

    pub(crate) fn resolve(&self) -> Result<Args, RunId> {
        let mut args = Args::new();
        for (name, param) in &self.items {
            args.insert(name.clone(), param.resolve()?);
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::detached;
    use serde_json::json;
    use strand_model::TaskFailure;

    #[test]
    fn resolve_replaces_completed_futures() {
        let up = detached("up");
        up.transition(State::running());
        up.transition(State::completed(json!(7)));

        let params = Parameters::new()
            .with("x", json!(1))
            .with("y", &up)
            .with("zs", vec![Param::from(json!(2)), Param::from(&up)]);

        let args = params.resolve().unwrap();
        assert_eq!(args.get_raw("x"), Some(&json!(1)));
        assert_eq!(args.get_raw("y"), Some(&json!(7)));
        assert_eq!(args.get_raw("zs"), Some(&json!([2, 7])));
    }

    #[test]
    fn resolve_reports_first_unfinished_future() {
        let done = detached("done");
        done.transition(State::completed(json!(1)));
        let failed = detached("failed");
        failed.transition(State::failed(TaskFailure::raised("x")));

        let params = Parameters::new().with("a", &done).with("b", &failed);
        assert_eq!(params.resolve().unwrap_err(), failed.run_id());
    }

    #[test]
    fn upstreams_are_collected_from_nested_lists() {
        let a = detached("a");
        let b = detached("b");
        let params = Parameters::new()
            .with("a", &a)
            .with("nested", vec![vec![Param::from(&b)]]);
        let ids: Vec<_> = params.upstreams().iter().map(|f| f.run_id()).collect();
        assert_eq!(ids, vec![a.run_id(), b.run_id()]);
    }

    #[test]
    fn insert_replaces_existing_name() {
        let params = Parameters::new().with("a", json!(1)).with("a", json!(2));
        assert_eq!(params.len(), 1);
        assert!(matches!(params.get("a"), Some(Param::Value(v)) if *v == json!(2)));
    }

    #[test]
    fn gather_keeps_structure() {
        let ok = detached("ok");
        ok.transition(State::completed(json!("v")));
        let bad = detached("bad");
        bad.transition(State::failed(TaskFailure::raised("nope")));

        let gathered = Param::from(vec![Param::from(&ok), Param::from(&bad), json!(3).into()]).gather();
        let items = gathered.as_list().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].value(), Some(&json!("v")));
        assert!(items[1].as_state().unwrap().is_failed());
        assert_eq!(items[2].value(), Some(&json!(3)));
    }
}
