//! In-memory travel concepts. Each owns its state and never calls another
//! concept; rules wire them together.

pub mod cost_splitting;
pub mod itinerary_planner;
pub mod polling;
pub mod session;
pub mod trip_planning;

pub use cost_splitting::CostSplitting;
pub use itinerary_planner::ItineraryPlanner;
pub use polling::Polling;
pub use session::Session;
pub use trip_planning::TripPlanning;

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use waypoint_engine::Payload;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

fn ok() -> Payload {
    Payload::new()
}

fn error(message: impl Into<String>) -> Payload {
    object(json!({ "error": message.into() }))
}

fn doc<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Non-empty string field.
fn text<'a>(input: &'a Payload, field: &str) -> Option<&'a str> {
    input
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn number(input: &Payload, field: &str) -> Option<f64> {
    input.get(field).and_then(Value::as_f64)
}
