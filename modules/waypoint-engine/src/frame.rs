//! Frames: binding environments and the operations `where` clauses use.
//!
//! A [`Frame`] maps variables to concrete values and never holds two values
//! for one variable. [`Frames`] is an ordered multiset of alternatives; each
//! surviving frame independently drives the rule's `then` actions.

use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::error::EngineError;
use crate::pattern::{Template, Term};
use crate::traits::QueryFn;
use crate::unify::{match_template, values_equal};
use crate::vars::Var;
use crate::Payload;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame(BTreeMap<Var, Value>);

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, var: Var) -> Option<&Value> {
        self.0.get(&var)
    }

    pub fn get_str(&self, var: Var) -> Option<&str> {
        self.get(var).and_then(Value::as_str)
    }

    /// Bound and not JSON null.
    pub fn is_present(&self, var: Var) -> bool {
        self.get(var).is_some_and(|v| !v.is_null())
    }

    pub fn contains(&self, var: Var) -> bool {
        self.0.contains_key(&var)
    }

    /// Unification-style bind: succeeds if `var` is unbound or already holds
    /// an equal value, numbers comparing by value. On conflict the frame is
    /// left untouched.
    pub fn bind(&mut self, var: Var, value: &Value) -> bool {
        match self.0.get(&var) {
            Some(existing) => values_equal(existing, value),
            None => {
                self.0.insert(var, value.clone());
                true
            }
        }
    }

    /// Derive a new frame with `var` set to `value`, replacing any binding.
    pub fn with(mut self, var: Var, value: impl Into<Value>) -> Self {
        self.0.insert(var, value.into());
        self
    }

    /// Consistent union of two frames, or `None` if any shared variable
    /// disagrees.
    pub fn merge(&self, other: &Frame) -> Option<Frame> {
        let mut merged = self.clone();
        for (var, value) in &other.0 {
            if !merged.bind(*var, value) {
                return None;
            }
        }
        Some(merged)
    }

    /// Substitute bound variables into a template.
    pub fn resolve(&self, template: &Template) -> Result<Payload, EngineError> {
        template
            .iter()
            .map(|(field, term)| {
                let value = match term {
                    Term::Lit(value) => value.clone(),
                    Term::Var(var) => self
                        .get(*var)
                        .cloned()
                        .ok_or_else(|| EngineError::unbound(*var))?,
                };
                Ok((field.to_string(), value))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Var, &Value)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }
}

impl<const N: usize> From<[(Var, Value); N]> for Frame {
    fn from(bindings: [(Var, Value); N]) -> Self {
        Frame(bindings.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frames(Vec<Frame>);

impl Frames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(frame: Frame) -> Self {
        Frames(vec![frame])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.0.iter()
    }

    pub fn push(&mut self, frame: Frame) {
        self.0.push(frame);
    }

    pub fn into_vec(self) -> Vec<Frame> {
        self.0
    }

    /// Pure per-frame transform.
    pub fn map(self, f: impl FnMut(Frame) -> Frame) -> Frames {
        Frames(self.0.into_iter().map(f).collect())
    }

    /// Per-frame transform that may fail; the first failure aborts the set.
    pub fn try_map(self, f: impl FnMut(Frame) -> Result<Frame>) -> Result<Frames> {
        Ok(Frames(self.0.into_iter().map(f).collect::<Result<_>>()?))
    }

    /// Keep frames satisfying `keep`.
    pub fn filter(self, mut keep: impl FnMut(&Frame) -> bool) -> Frames {
        Frames(self.0.into_iter().filter(|f| keep(f)).collect())
    }

    /// Run a read-query for every frame and unify each result row against
    /// `output`. A frame yields one descendant per matching row: none drops
    /// it, several fan it out.
    ///
    /// Every variable in `input` must already be bound.
    pub async fn query<Q>(
        self,
        query: &Q,
        input: impl Into<Template>,
        output: impl Into<Template>,
    ) -> Result<Frames>
    where
        Q: QueryFn + ?Sized,
    {
        let input = input.into();
        let output = output.into();
        let mut result = Vec::new();

        for frame in self.0 {
            let args = frame.resolve(&input)?;
            let rows = query.call(args).await?;
            let before = result.len();
            for row in &rows {
                let mut candidate = frame.clone();
                if match_template(&mut candidate, &output, row) {
                    result.push(candidate);
                }
            }
            debug!(
                query = query.label(),
                rows = rows.len(),
                kept = result.len() - before,
                "Query bridged"
            );
        }

        Ok(Frames(result))
    }
}

impl IntoIterator for Frames {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Frame> for Frames {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Frames(iter.into_iter().collect())
    }
}

impl From<Vec<Frame>> for Frames {
    fn from(frames: Vec<Frame>) -> Self {
        Frames(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::lit;
    use crate::traits::query_fn;
    use crate::vars::Vars;
    use serde_json::json;

    fn row(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn bind_rejects_conflicts() {
        let mut vars = Vars::new();
        let a = vars.var("a");
        let mut frame = Frame::new();
        assert!(frame.bind(a, &json!(1)));
        assert!(frame.bind(a, &json!(1)));
        assert!(!frame.bind(a, &json!(2)));
        assert_eq!(frame.get(a), Some(&json!(1)));
    }

    #[test]
    fn merge_requires_agreement_on_shared_vars() {
        let [a, b, c] = Vars::new().many(["a", "b", "c"]);
        let left = Frame::from([(a, json!(1)), (b, json!(2))]);
        let agree = Frame::from([(b, json!(2)), (c, json!(3))]);
        let disagree = Frame::from([(b, json!(9))]);

        let merged = left.merge(&agree).unwrap();
        assert_eq!(merged.len(), 3);
        assert!(left.merge(&disagree).is_none());
    }

    #[test]
    fn merge_treats_equal_numbers_as_equal() {
        let [cost] = Vars::new().many(["cost"]);
        let whole = Frame::from([(cost, json!(1))]);
        let float = Frame::from([(cost, json!(1.0))]);

        assert!(whole.merge(&float).is_some());
        assert!(whole.merge(&Frame::from([(cost, json!(1.5))])).is_none());
    }

    #[test]
    fn resolve_substitutes_vars_and_literals() {
        let [request, error] = Vars::new().many(["request", "error"]);
        let frame = Frame::from([(request, json!("r1"))]);

        let template = Template::new()
            .field("request", request)
            .field("error", lit("Unauthorized"))
            .field("status", lit(401));
        let resolved = frame.resolve(&template).unwrap();
        assert_eq!(
            Value::Object(resolved),
            json!({"request": "r1", "error": "Unauthorized", "status": 401})
        );

        let missing = Template::new().field("error", error);
        assert!(matches!(
            frame.resolve(&missing),
            Err(EngineError::UnboundVariable { .. })
        ));
    }

    #[test]
    fn map_and_filter_are_per_frame() {
        let [x, y] = Vars::new().many(["x", "y"]);
        let frames: Frames = (1..=4).map(|n| Frame::new().with(x, n)).collect();

        let doubled = frames
            .map(|f| {
                let n = f.get(x).and_then(Value::as_i64).unwrap_or(0);
                f.with(y, n * 2)
            })
            .filter(|f| f.get(y).and_then(Value::as_i64).unwrap_or(0) > 4);

        assert_eq!(doubled.len(), 2);
        assert!(doubled.iter().all(|f| f.contains(x) && f.contains(y)));
    }

    #[test]
    fn try_map_fails_the_whole_set() {
        let [x] = Vars::new().many(["x"]);
        let frames: Frames = (1..=3).map(|n| Frame::new().with(x, n)).collect();
        let result = frames.try_map(|f| {
            if f.get(x) == Some(&json!(2)) {
                anyhow::bail!("bad frame")
            }
            Ok(f)
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn query_fans_out_and_in() {
        let [owner, trip] = Vars::new().many(["owner", "trip"]);
        let trips_by_owner = query_fn("trips_by_owner", |input: Payload| async move {
            let rows = match input.get("owner").and_then(Value::as_str) {
                Some("alice") => vec![row(json!({"trip": "t1"})), row(json!({"trip": "t2"}))],
                Some("bob") => vec![row(json!({"trip": "t3"}))],
                _ => vec![],
            };
            anyhow::Ok(rows)
        });

        let frames: Frames = ["alice", "bob", "carol"]
            .into_iter()
            .map(|name| Frame::new().with(owner, name))
            .collect();

        let out = frames
            .query(&trips_by_owner, [("owner", owner)], [("trip", trip)])
            .await
            .unwrap();

        let pairs: Vec<_> = out
            .iter()
            .map(|f| (f.get_str(owner).unwrap(), f.get_str(trip).unwrap()))
            .collect();
        assert_eq!(pairs, vec![("alice", "t1"), ("alice", "t2"), ("bob", "t3")]);
    }

    #[tokio::test]
    async fn query_output_respects_existing_bindings() {
        let [id, status] = Vars::new().many(["id", "status"]);
        let lookup = query_fn("lookup", |_input: Payload| async move {
            anyhow::Ok(vec![row(json!({"status": "open"}))])
        });

        let frames = Frames::from(vec![
            Frame::new().with(id, "a").with(status, "open"),
            Frame::new().with(id, "b").with(status, "closed"),
        ]);
        let out = frames
            .query(&lookup, [("id", id)], [("status", status)])
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out.iter().next().unwrap().get_str(id), Some("a"));
    }

    #[tokio::test]
    async fn query_with_unbound_input_errors() {
        let [id, record] = Vars::new().many(["id", "record"]);
        let lookup = query_fn("lookup", |_input: Payload| async move { anyhow::Ok(vec![]) });
        let result = Frames::single(Frame::new())
            .query(&lookup, [("id", id)], [("record", record)])
            .await;
        assert!(result.is_err());
    }
}
