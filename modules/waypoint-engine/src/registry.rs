//! The action registry: every instrumented operation by (concept, name).
//!
//! Rules resolve operations through the registry when they are built, so a
//! rule never refers to a concept instance directly.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::error::EngineError;
use crate::pattern::Pattern;
use crate::traits::{Concept, QueryFn};
use crate::Payload;

/// Opaque identity of a registered action. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u32);

impl ActionId {
    pub const fn from_raw(raw: u32) -> Self {
        ActionId(raw)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Action,
    Query,
}

/// Declared shape of one operation. Field lists are optional; when present,
/// patterns may only mention declared fields (`error` is always allowed on
/// outputs).
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    pub name: String,
    pub kind: OperationKind,
    pub input: Option<Vec<String>>,
    pub output: Option<Vec<String>>,
}

impl ActionSpec {
    pub fn action(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Action,
            input: None,
            output: None,
        }
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Query,
            ..Self::action(name)
        }
    }

    pub fn input<const N: usize>(mut self, fields: [&str; N]) -> Self {
        self.input = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn output<const N: usize>(mut self, fields: [&str; N]) -> Self {
        self.output = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }
}

struct Entry {
    concept: Arc<dyn Concept>,
    spec: ActionSpec,
    qualified: String,
}

/// Explicit registry of concepts, handed to the engine at construction.
#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
    by_name: HashMap<String, ActionId>,
    concepts: HashMap<String, Arc<dyn Concept>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concept and all of its operations.
    pub fn register(&mut self, concept: Arc<dyn Concept>) -> Result<(), EngineError> {
        let name = concept.name().to_string();
        if self.concepts.contains_key(&name) {
            return Err(EngineError::DuplicateConcept(name));
        }

        for spec in concept.operations() {
            let qualified = format!("{name}.{}", spec.name);
            let id = ActionId(self.entries.len() as u32);
            debug!(action = qualified.as_str(), %id, "Registered operation");
            self.by_name.insert(qualified.clone(), id);
            self.entries.push(Entry {
                concept: concept.clone(),
                spec,
                qualified,
            });
        }
        self.concepts.insert(name, concept);
        Ok(())
    }

    pub fn with_concept(mut self, concept: Arc<dyn Concept>) -> Result<Self, EngineError> {
        self.register(concept)?;
        Ok(self)
    }

    /// Identity of an action (not a query).
    pub fn action(&self, concept: &str, name: &str) -> Result<ActionId, EngineError> {
        let qualified = format!("{concept}.{name}");
        if !self.concepts.contains_key(concept) {
            return Err(EngineError::UnknownConcept(concept.to_string()));
        }
        match self.by_name.get(&qualified) {
            Some(id) if self.entries[id.index()].spec.kind == OperationKind::Action => Ok(*id),
            _ => Err(EngineError::UnknownAction(qualified)),
        }
    }

    /// Handle to a concept query, callable from `where` clauses.
    pub fn query(&self, concept: &str, name: &str) -> Result<QueryRef, EngineError> {
        let qualified = format!("{concept}.{name}");
        let concept_ref = self
            .concepts
            .get(concept)
            .ok_or_else(|| EngineError::UnknownConcept(concept.to_string()))?;
        match self.by_name.get(&qualified) {
            Some(id) if self.entries[id.index()].spec.kind == OperationKind::Query => Ok(QueryRef {
                concept: concept_ref.clone(),
                name: name.to_string(),
                qualified,
            }),
            _ => Err(EngineError::UnknownQuery(qualified)),
        }
    }

    /// Look up any operation by `Concept.name`.
    pub fn lookup(&self, qualified: &str) -> Option<ActionId> {
        self.by_name.get(qualified).copied()
    }

    pub fn kind(&self, id: ActionId) -> Option<OperationKind> {
        self.entries.get(id.index()).map(|e| e.spec.kind)
    }

    pub fn qualified_name(&self, id: ActionId) -> &str {
        self.entries
            .get(id.index())
            .map(|e| e.qualified.as_str())
            .unwrap_or("<unregistered>")
    }

    pub fn spec(&self, id: ActionId) -> Option<&ActionSpec> {
        self.entries.get(id.index()).map(|e| &e.spec)
    }

    pub fn concept(&self, name: &str) -> Option<Arc<dyn Concept>> {
        self.concepts.get(name).cloned()
    }

    /// Every registered operation, in registration order.
    pub fn operations(&self) -> impl Iterator<Item = (ActionId, &str, OperationKind)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (ActionId(i as u32), e.qualified.as_str(), e.spec.kind))
    }

    /// Check a pattern against the registry: the action must exist and be an
    /// action, and every mentioned field must be declared when the action
    /// declares its fields. Output templates are only checked when
    /// `check_output` is set (they are ignored on `then` patterns).
    pub fn validate(&self, pattern: &Pattern, check_output: bool) -> Result<(), EngineError> {
        let entry = self
            .entries
            .get(pattern.action.index())
            .ok_or_else(|| EngineError::UnknownAction(pattern.action.to_string()))?;
        if entry.spec.kind != OperationKind::Action {
            return Err(EngineError::UnknownAction(entry.qualified.clone()));
        }

        let undeclared = |declared: &Option<Vec<String>>, field: &str| match declared {
            Some(fields) => !fields.iter().any(|f| f == field),
            None => false,
        };

        for field in pattern.input.fields() {
            if undeclared(&entry.spec.input, field) {
                return Err(EngineError::UnknownField {
                    action: entry.qualified.clone(),
                    field: field.to_string(),
                });
            }
        }
        if check_output {
            for field in pattern.output.fields() {
                if field != "error" && undeclared(&entry.spec.output, field) {
                    return Err(EngineError::UnknownField {
                        action: entry.qualified.clone(),
                        field: field.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Invoke an action's underlying concept code.
    pub async fn perform(&self, id: ActionId, input: Payload) -> Result<Payload> {
        let entry = self
            .entries
            .get(id.index())
            .ok_or_else(|| EngineError::UnknownAction(id.to_string()))?;
        entry.concept.perform(&entry.spec.name, input).await
    }
}

/// A concept query resolved through the registry.
#[derive(Clone)]
pub struct QueryRef {
    concept: Arc<dyn Concept>,
    name: String,
    qualified: String,
}

impl QueryRef {
    pub fn qualified_name(&self) -> &str {
        &self.qualified
    }
}

impl fmt::Debug for QueryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueryRef").field(&self.qualified).finish()
    }
}

#[async_trait]
impl QueryFn for QueryRef {
    async fn call(&self, input: Payload) -> Result<Vec<Payload>> {
        self.concept.query(&self.name, input).await
    }

    fn label(&self) -> &str {
        &self.qualified
    }
}
