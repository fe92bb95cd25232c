//! Patterns: an action identity plus input/output templates.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::payload::Outcome;
use crate::registry::ActionId;
use crate::vars::Var;
use crate::Payload;

/// A template slot: a variable to bind or a literal to compare.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Var(Var),
    Lit(Value),
}

impl From<Var> for Term {
    fn from(var: Var) -> Self {
        Term::Var(var)
    }
}

/// A literal template value.
pub fn lit(value: impl Into<Value>) -> Term {
    Term::Lit(value.into())
}

/// Field name → term. Fields not mentioned are unconstrained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template(BTreeMap<String, Term>);

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, term: impl Into<Term>) -> Self {
        self.0.insert(name.into(), term.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn vars(&self) -> impl Iterator<Item = Var> + '_ {
        self.0.values().filter_map(|t| match t {
            Term::Var(v) => Some(*v),
            Term::Lit(_) => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, T: Into<Term>, const N: usize> From<[(K, T); N]> for Template {
    fn from(fields: [(K, T); N]) -> Self {
        fields
            .into_iter()
            .fold(Template::new(), |t, (k, v)| t.field(k, v))
    }
}

/// Which output shapes a pattern accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutcomeFilter {
    #[default]
    Any,
    Success,
    Error,
}

impl OutcomeFilter {
    pub fn admits(self, output: &Payload) -> bool {
        match self {
            OutcomeFilter::Any => true,
            OutcomeFilter::Success => !Outcome::is_error_payload(output),
            OutcomeFilter::Error => Outcome::is_error_payload(output),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub action: ActionId,
    pub input: Template,
    pub output: Template,
    pub outcome: OutcomeFilter,
}

impl Pattern {
    pub fn new(action: ActionId) -> Self {
        Self {
            action,
            input: Template::new(),
            output: Template::new(),
            outcome: OutcomeFilter::Any,
        }
    }

    pub fn input(mut self, field: impl Into<String>, term: impl Into<Term>) -> Self {
        self.input = self.input.field(field, term);
        self
    }

    /// Constrain an output field. Mentioning `error` restricts the pattern
    /// to error outcomes.
    pub fn output(mut self, field: impl Into<String>, term: impl Into<Term>) -> Self {
        let field = field.into();
        if field == "error" {
            self.outcome = OutcomeFilter::Error;
        }
        self.output = self.output.field(field, term);
        self
    }

    /// Only match completions whose output is not error-shaped.
    pub fn succeeded(mut self) -> Self {
        self.outcome = OutcomeFilter::Success;
        self
    }

    /// Only match error-shaped completions.
    pub fn failed(mut self) -> Self {
        self.outcome = OutcomeFilter::Error;
        self
    }

    /// Every variable mentioned by either template.
    pub fn vars(&self) -> impl Iterator<Item = Var> + '_ {
        self.input.vars().chain(self.output.vars())
    }
}
