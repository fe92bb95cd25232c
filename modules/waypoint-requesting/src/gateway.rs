//! In-process request gateway.
//!
//! `handle(path, body)` either calls a whitelisted concept operation
//! directly or opens a `Requesting.request`, lets the engine run every rule
//! it triggers, and returns whatever a rule responded with.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use waypoint_engine::{
    ActionId, Concept, Engine, OperationKind, Payload, RecordPersister, RecordStore, RunReport,
};

use crate::concept::{self, Requesting};
use crate::routes::{operation_for, PassthroughRoutes};

/// Maps a session token to a verified user id.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, session: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Passthrough,
    Requested,
}

#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub route: RouteKind,
    pub body: Value,
    /// The run the call started, if it invoked an action.
    pub report: Option<RunReport>,
}

impl GatewayResponse {
    /// An explicit numeric `status` field wins; otherwise errors are 400.
    pub fn status(&self) -> u16 {
        let Some(body) = self.body.as_object() else {
            return 200;
        };
        if let Some(status) = body.get("status").and_then(Value::as_u64) {
            return u16::try_from(status).unwrap_or(500);
        }
        if body.contains_key("error") {
            400
        } else {
            200
        }
    }

    pub fn is_error(&self) -> bool {
        self.status() >= 400
    }
}

pub struct Gateway<P: RecordPersister = RecordStore> {
    engine: Arc<Engine<P>>,
    requesting: Arc<Requesting>,
    routes: PassthroughRoutes,
    sessions: Option<Arc<dyn SessionResolver>>,
    request_action: ActionId,
}

impl<P: RecordPersister> Gateway<P> {
    /// The engine's registry must contain `requesting`.
    pub fn new(engine: Arc<Engine<P>>, requesting: Arc<Requesting>, routes: PassthroughRoutes) -> Result<Self> {
        let request_action = engine.registry().action(concept::NAME, "request")?;

        let base_url = requesting.config().base_url.as_str();
        for route in routes.unverified(base_url, engine.registry()) {
            warn!(route = route.as_str(), "Route is neither included nor excluded, serving through Requesting");
        }

        Ok(Self {
            engine,
            requesting,
            routes,
            sessions: None,
            request_action,
        })
    }

    pub fn with_sessions(mut self, resolver: Arc<dyn SessionResolver>) -> Self {
        self.sessions = Some(resolver);
        self
    }

    pub fn engine(&self) -> &Arc<Engine<P>> {
        &self.engine
    }

    pub fn routes(&self) -> &PassthroughRoutes {
        &self.routes
    }

    pub async fn handle(&self, path: &str, body: Payload) -> Result<GatewayResponse> {
        let config = self.requesting.config();
        let route = config.strip_base(path);
        let full = format!("{}{route}", config.base_url);
        let user = self.resolve_user(&body).await?;

        if let Some(reason) = self.routes.justification(&full) {
            info!(route, reason, "Passthrough request");
            self.passthrough(route, body, user).await
        } else {
            info!(route, verified = user.is_some(), "Request");
            self.request(route, body, user).await
        }
    }

    async fn resolve_user(&self, body: &Payload) -> Result<Option<String>> {
        let (Some(sessions), Some(session)) = (&self.sessions, body.get("session").and_then(Value::as_str)) else {
            return Ok(None);
        };
        let user = sessions.resolve(session).await?;
        if user.is_none() {
            debug!("Session did not resolve to a user");
        }
        Ok(user)
    }

    async fn passthrough(&self, route: &str, mut input: Payload, user: Option<String>) -> Result<GatewayResponse> {
        let not_found = || GatewayResponse {
            route: RouteKind::Passthrough,
            body: json!({ "error": format!("No operation at {route}"), "status": 404 }),
            report: None,
        };

        let Some(qualified) = operation_for(route) else {
            return Ok(not_found());
        };
        let registry = self.engine.registry();
        let Some(id) = registry.lookup(&qualified) else {
            return Ok(not_found());
        };
        if let Some(user) = user {
            input.insert("user".into(), Value::String(user));
        }

        match registry.kind(id) {
            Some(OperationKind::Action) => {
                let report = self.engine.invoke(id, input).await?;
                let body = report
                    .root()
                    .map(|record| Value::Object(record.output.clone()))
                    .unwrap_or(Value::Null);
                Ok(GatewayResponse {
                    route: RouteKind::Passthrough,
                    body,
                    report: Some(report),
                })
            }
            Some(OperationKind::Query) => {
                let (concept_name, query) = qualified.split_once('.').unwrap_or_default();
                let Some(concept) = registry.concept(concept_name) else {
                    return Ok(not_found());
                };
                let rows = concept.query(query, input).await?;
                Ok(GatewayResponse {
                    route: RouteKind::Passthrough,
                    body: Value::Array(rows.into_iter().map(Value::Object).collect()),
                    report: None,
                })
            }
            None => Ok(not_found()),
        }
    }

    /// Caller-supplied `user` is never trusted on this path: it is replaced
    /// by the session's verified user, or null.
    async fn request(&self, route: &str, mut input: Payload, user: Option<String>) -> Result<GatewayResponse> {
        input.insert("path".into(), Value::String(route.to_string()));
        input.insert("user".into(), user.map(Value::String).unwrap_or(Value::Null));

        let report = self.engine.invoke(self.request_action, input).await?;
        let request = report
            .root()
            .and_then(|root| root.output.get("request"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let body = match request {
            Some(request) => Value::Object(self.requesting.await_response(&request).await),
            None => report
                .root()
                .map(|root| Value::Object(root.output.clone()))
                .unwrap_or(Value::Null),
        };

        debug!(
            route,
            run_id = report.run_id.as_str(),
            records = report.records.len(),
            aborted = report.aborted.len(),
            "Request settled"
        );
        Ok(GatewayResponse {
            route: RouteKind::Requested,
            body,
            report: Some(report),
        })
    }
}
