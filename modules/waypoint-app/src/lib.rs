//! Travel planning app: trips, itineraries, polls and shared costs, wired
//! together by synchronization rules and served through the request gateway.

pub mod concepts;
pub mod config;
pub mod routes;
pub mod syncs;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::info;
use waypoint_engine::{payload, Engine, Payload, Registry};
use waypoint_requesting::{Gateway, GatewayResponse, Requesting};

use crate::concepts::{CostSplitting, ItineraryPlanner, Polling, Session, TripPlanning};
use crate::config::AppConfig;

pub struct TravelApp {
    gateway: Gateway,
    sessions: Arc<Session>,
}

impl TravelApp {
    pub fn build(config: AppConfig) -> Result<Self> {
        let requesting = Arc::new(Requesting::new(config.requesting.clone()));
        let sessions = Arc::new(Session::new());

        let registry = Registry::new()
            .with_concept(requesting.clone())?
            .with_concept(sessions.clone())?
            .with_concept(Arc::new(TripPlanning::new()))?
            .with_concept(Arc::new(ItineraryPlanner::new()))?
            .with_concept(Arc::new(Polling::new()))?
            .with_concept(Arc::new(CostSplitting::new()))?;

        let engine = Engine::builder(registry)
            .with_config(config.engine.clone())
            .with_syncs(syncs::ALL)?
            .build();
        info!(syncs = engine.syncs().len(), "Engine ready");

        let routes = routes::passthrough_routes(&config.requesting.base_url);
        let gateway = Gateway::new(Arc::new(engine), requesting, routes)?.with_sessions(sessions.clone());

        Ok(Self { gateway, sessions })
    }

    /// Serve one request. `path` may carry the base URL or not.
    pub async fn handle(&self, path: &str, body: Value) -> Result<GatewayResponse> {
        self.gateway.handle(path, payload(body)?).await
    }

    /// Open a session for `user` and return its token.
    pub fn login(&self, user: &str) -> Result<String> {
        let created: Payload = self.sessions.create(&payload(json!({ "user": user }))?);
        created
            .get("session")
            .and_then(Value::as_str)
            .map(str::to_string)
            .with_context(|| format!("Failed to open a session for {user}"))
    }

    pub fn sessions(&self) -> &Arc<Session> {
        &self.sessions
    }

    pub fn engine(&self) -> &Arc<Engine> {
        self.gateway.engine()
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }
}
