use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use waypoint_engine::{ActionSpec, Concept, Payload};

use super::{doc, error, fresh_id, lock, object, ok, text};

pub const NAME: &str = "TripPlanning";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Trip {
    #[serde(rename = "_id")]
    id: String,
    owner: String,
    name: String,
    destination: Value,
    date_range: Value,
    participants: Vec<String>,
}

/// Trips and who takes part in them.
#[derive(Default)]
pub struct TripPlanning {
    trips: Mutex<BTreeMap<String, Trip>>,
}

impl TripPlanning {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, input: &Payload) -> Payload {
        let Some(owner) = text(input, "owner") else {
            return error("Trip owner is required.");
        };
        let Some(name) = text(input, "name") else {
            return error("Trip name is required.");
        };

        let id = fresh_id();
        lock(&self.trips).insert(
            id.clone(),
            Trip {
                id: id.clone(),
                owner: owner.to_string(),
                name: name.to_string(),
                destination: input.get("destination").cloned().unwrap_or(Value::Null),
                date_range: input.get("dateRange").cloned().unwrap_or(Value::Null),
                participants: vec![owner.to_string()],
            },
        );
        debug!(trip = id.as_str(), owner, "Trip created");
        object(json!({ "tripId": id }))
    }

    fn delete(&self, input: &Payload) -> Payload {
        let (Some(owner), Some(trip_id)) = (text(input, "owner"), text(input, "tripId")) else {
            return error("owner and tripId are required.");
        };
        let mut trips = lock(&self.trips);
        match trips.get(trip_id) {
            None => error(format!("Trip {trip_id} not found.")),
            Some(trip) if trip.owner != owner => error("Only the trip owner can delete a trip."),
            Some(_) => {
                trips.remove(trip_id);
                ok()
            }
        }
    }

    fn add_participant(&self, input: &Payload) -> Payload {
        let (Some(owner), Some(trip_id), Some(participant)) = (
            text(input, "owner"),
            text(input, "tripId"),
            text(input, "participant"),
        ) else {
            return error("owner, tripId and participant are required.");
        };
        let mut trips = lock(&self.trips);
        let Some(trip) = trips.get_mut(trip_id) else {
            return error(format!("Trip {trip_id} not found."));
        };
        if trip.owner != owner {
            return error("Only the trip owner can add participants.");
        }
        if trip.participants.iter().any(|p| p == participant) {
            return error(format!("{participant} is already a participant."));
        }
        trip.participants.push(participant.to_string());
        ok()
    }

    fn trip_by_id(&self, input: &Payload) -> Result<Vec<Payload>> {
        let trips = lock(&self.trips);
        let Some(trip) = text(input, "tripId").and_then(|id| trips.get(id)) else {
            return Ok(Vec::new());
        };
        Ok(vec![object(json!({ "trip": doc(trip)? }))])
    }

    fn trips_by_user(&self, input: &Payload) -> Result<Vec<Payload>> {
        let Some(user) = text(input, "user") else {
            return Ok(Vec::new());
        };
        lock(&self.trips)
            .values()
            .filter(|trip| trip.participants.iter().any(|p| p == user))
            .map(|trip| Ok(object(json!({ "trip": doc(trip)? }))))
            .collect()
    }

    fn participants(&self, input: &Payload) -> Vec<Payload> {
        let trips = lock(&self.trips);
        text(input, "tripId")
            .and_then(|id| trips.get(id))
            .map(|trip| vec![object(json!({ "participants": trip.participants }))])
            .unwrap_or_default()
    }
}

#[async_trait]
impl Concept for TripPlanning {
    fn name(&self) -> &str {
        NAME
    }

    fn operations(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec::action("create")
                .input(["owner", "destination", "dateRange", "name"])
                .output(["tripId"]),
            ActionSpec::action("delete").input(["owner", "tripId"]),
            ActionSpec::action("addParticipant").input(["owner", "tripId", "participant"]),
            ActionSpec::query("_getTripById").input(["tripId"]).output(["trip"]),
            ActionSpec::query("_getTripsByUser").input(["user"]).output(["trip"]),
            ActionSpec::query("_getParticipantsInTrip")
                .input(["tripId"])
                .output(["participants"]),
        ]
    }

    async fn perform(&self, action: &str, input: Payload) -> Result<Payload> {
        Ok(match action {
            "create" => self.create(&input),
            "delete" => self.delete(&input),
            "addParticipant" => self.add_participant(&input),
            other => anyhow::bail!("{NAME} has no action {other}"),
        })
    }

    async fn query(&self, query: &str, input: Payload) -> Result<Vec<Payload>> {
        match query {
            "_getTripById" => self.trip_by_id(&input),
            "_getTripsByUser" => self.trips_by_user(&input),
            "_getParticipantsInTrip" => Ok(self.participants(&input)),
            other => anyhow::bail!("{NAME} has no query {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(value: Value) -> Payload {
        object(value)
    }

    #[test]
    fn only_owner_deletes() {
        let trips = TripPlanning::new();
        let created = trips.create(&p(json!({"owner": "ana", "name": "Lisbon"})));
        let id = created["tripId"].clone();

        assert!(trips.delete(&p(json!({"owner": "ben", "tripId": id}))).contains_key("error"));
        assert!(trips.delete(&p(json!({"owner": "ana", "tripId": id}))).is_empty());
        assert!(trips.delete(&p(json!({"owner": "ana", "tripId": id}))).contains_key("error"));
    }

    #[test]
    fn name_is_required() {
        let trips = TripPlanning::new();
        let out = trips.create(&p(json!({"owner": "ana", "name": "  "})));
        assert_eq!(out["error"], json!("Trip name is required."));
    }

    #[test]
    fn participants_include_owner() {
        let trips = TripPlanning::new();
        let id = trips.create(&p(json!({"owner": "ana", "name": "Oslo"})))["tripId"].clone();
        trips.add_participant(&p(json!({"owner": "ana", "tripId": id, "participant": "ben"})));

        let rows = trips.participants(&p(json!({"tripId": id})));
        assert_eq!(rows[0]["participants"], json!(["ana", "ben"]));
        assert_eq!(trips.trips_by_user(&p(json!({"user": "ben"}))).unwrap().len(), 1);
    }
}
