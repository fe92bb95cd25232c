//! Scripted in-memory concepts for engine tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use waypoint_engine::{ActionSpec, Concept, Payload};

type ActionHandler = Arc<dyn Fn(&Payload) -> Result<Payload> + Send + Sync>;
type QueryHandler = Arc<dyn Fn(&Payload) -> Vec<Payload> + Send + Sync>;

pub fn p(value: Value) -> Payload {
    waypoint_engine::payload(value).expect("test payloads are objects")
}

/// A concept whose actions and queries are closures. Records every call.
pub struct Scripted {
    name: String,
    actions: HashMap<String, ActionHandler>,
    queries: HashMap<String, QueryHandler>,
    specs: Vec<ActionSpec>,
    calls: Mutex<Vec<(String, Payload)>>,
}

impl Scripted {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            actions: HashMap::new(),
            queries: HashMap::new(),
            specs: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn action(
        mut self,
        name: &str,
        f: impl Fn(&Payload) -> Result<Payload> + Send + Sync + 'static,
    ) -> Self {
        self.actions.insert(name.to_string(), Arc::new(f));
        self.specs.push(ActionSpec::action(name));
        self
    }

    /// An action with a declared schema.
    pub fn typed_action(
        mut self,
        spec: ActionSpec,
        f: impl Fn(&Payload) -> Result<Payload> + Send + Sync + 'static,
    ) -> Self {
        self.actions.insert(spec.name.clone(), Arc::new(f));
        self.specs.push(spec);
        self
    }

    /// An action that returns its input unchanged.
    pub fn echo(self, name: &str) -> Self {
        self.action(name, |input| Ok(input.clone()))
    }

    pub fn query(
        mut self,
        name: &str,
        f: impl Fn(&Payload) -> Vec<Payload> + Send + Sync + 'static,
    ) -> Self {
        self.queries.insert(name.to_string(), Arc::new(f));
        self.specs.push(ActionSpec::query(name));
        self
    }

    pub fn calls(&self, action: &str) -> Vec<Payload> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == action)
            .map(|(_, input)| input.clone())
            .collect()
    }

    pub fn call_order(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl Concept for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn operations(&self) -> Vec<ActionSpec> {
        self.specs.clone()
    }

    async fn perform(&self, action: &str, input: Payload) -> Result<Payload> {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), input.clone()));
        let handler = self
            .actions
            .get(action)
            .ok_or_else(|| anyhow::anyhow!("{} has no action {action}", self.name))?;
        handler(&input)
    }

    async fn query(&self, query: &str, input: Payload) -> Result<Vec<Payload>> {
        let handler = self
            .queries
            .get(query)
            .ok_or_else(|| anyhow::anyhow!("{} has no query {query}", self.name))?;
        Ok(handler(&input))
    }
}
