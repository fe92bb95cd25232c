//! Synchronizations: declarative `when` / `where` / `then` rules.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;

use crate::error::EngineError;
use crate::frame::Frames;
use crate::pattern::Pattern;
use crate::registry::Registry;
use crate::traits::{where_fn, Where};
use crate::vars::{Var, Vars};

/// A rule-defining function. Receives a fresh variable scope and the
/// registry to resolve operations through.
pub type SyncDef = fn(&mut Vars, &Registry) -> Result<SyncSpec>;

/// What a rule-defining function returns.
#[derive(Default)]
pub struct SyncSpec {
    pub when: Vec<Pattern>,
    pub where_clause: Option<Arc<dyn Where>>,
    pub then: Vec<Pattern>,
}

impl SyncSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, pattern: Pattern) -> Self {
        self.when.push(pattern);
        self
    }

    /// Refine joined frames with an async closure.
    pub fn where_fn<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Frames) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Frames>> + Send + 'static,
    {
        self.where_clause = Some(Arc::new(where_fn(f)));
        self
    }

    /// Output templates of `then` patterns are ignored.
    pub fn then(mut self, pattern: Pattern) -> Self {
        self.then.push(pattern);
        self
    }
}

/// A registered rule: its name, its private variable scope, and its clauses.
pub struct Synchronization {
    name: String,
    vars: Vars,
    spec: SyncSpec,
}

impl Synchronization {
    /// Instantiate a rule with fresh variables and validate it.
    pub fn instantiate(name: &str, def: SyncDef, registry: &Registry) -> Result<Self> {
        let mut vars = Vars::new();
        let spec = def(&mut vars, registry)?;

        if spec.when.is_empty() {
            anyhow::bail!("sync {name} has no when patterns");
        }
        for pattern in &spec.when {
            registry.validate(pattern, true)?;
        }
        for pattern in &spec.then {
            registry.validate(pattern, false)?;
        }

        Ok(Self {
            name: name.to_string(),
            vars,
            spec,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn when(&self) -> &[Pattern] {
        &self.spec.when
    }

    pub fn where_clause(&self) -> Option<&Arc<dyn Where>> {
        self.spec.where_clause.as_ref()
    }

    pub fn then(&self) -> &[Pattern] {
        &self.spec.then
    }

    /// Variables `then` needs that no `when` pattern binds. Without a
    /// `where` clause these can never be bound.
    pub fn unbound_then_vars(&self) -> Vec<Var> {
        let bound: HashSet<Var> = self.spec.when.iter().flat_map(|p| p.vars()).collect();
        let mut missing: Vec<Var> = self
            .spec
            .then
            .iter()
            .flat_map(|p| p.input.vars())
            .filter(|v| !bound.contains(v))
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Attach this rule's variable names to an error.
    pub(crate) fn describe_error(&self, mut error: EngineError) -> EngineError {
        if let EngineError::UnboundVariable { var, name } = &mut error {
            *name = self.vars.describe(*var);
        }
        error
    }
}

impl fmt::Debug for Synchronization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronization")
            .field("name", &self.name)
            .field("when", &self.spec.when.len())
            .field("where", &self.spec.where_clause.is_some())
            .field("then", &self.spec.then.len())
            .finish()
    }
}
