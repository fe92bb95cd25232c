use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use waypoint_engine::{ActionSpec, Concept, Payload};

use super::{doc, error, fresh_id, lock, number, object, ok, text};

pub const NAME: &str = "ItineraryPlanner";

#[derive(Debug, Clone, Serialize)]
struct Itinerary {
    #[serde(rename = "_id")]
    id: String,
    trip: String,
    finalized: bool,
    events: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    #[serde(rename = "_id")]
    id: String,
    itinerary_id: String,
    name: String,
    cost: f64,
    approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    poll: Option<String>,
}

#[derive(Default)]
struct State {
    itineraries: BTreeMap<String, Itinerary>,
    events: BTreeMap<String, Event>,
}

impl State {
    /// The itinerary, if it exists and can still change.
    fn open_itinerary(&mut self, id: &str) -> Result<&mut Itinerary, Payload> {
        match self.itineraries.get_mut(id) {
            None => Err(error(format!("Itinerary {id} not found."))),
            Some(it) if it.finalized => Err(error(format!(
                "Itinerary {id} is finalized and cannot be modified."
            ))),
            Some(it) => Ok(it),
        }
    }
}

/// One itinerary per trip, holding proposed and approved events.
#[derive(Default)]
pub struct ItineraryPlanner {
    state: Mutex<State>,
}

impl ItineraryPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creating an itinerary for a trip that already has one returns the
    /// existing itinerary.
    fn create(&self, input: &Payload) -> Payload {
        let Some(trip) = text(input, "trip") else {
            return error("Missing required field: trip");
        };
        let mut state = lock(&self.state);
        if let Some(existing) = state.itineraries.values().find(|it| it.trip == trip) {
            debug!(trip, itinerary = existing.id.as_str(), "Itinerary already exists");
            return object(json!({ "itinerary": existing.id }));
        }

        let id = fresh_id();
        state.itineraries.insert(
            id.clone(),
            Itinerary {
                id: id.clone(),
                trip: trip.to_string(),
                finalized: false,
                events: Vec::new(),
            },
        );
        object(json!({ "itinerary": id }))
    }

    fn add_event(&self, input: &Payload) -> Payload {
        let (Some(itinerary), Some(name)) = (text(input, "itinerary"), text(input, "name")) else {
            return error("Missing required fields: name, cost, itinerary");
        };
        let Some(cost) = number(input, "cost").filter(|c| *c >= 0.0) else {
            return error("Event cost must be a non-negative number.");
        };

        let mut state = lock(&self.state);
        let event = fresh_id();
        match state.open_itinerary(itinerary) {
            Err(e) => return e,
            Ok(it) => it.events.push(event.clone()),
        }
        state.events.insert(
            event.clone(),
            Event {
                id: event.clone(),
                itinerary_id: itinerary.to_string(),
                name: name.to_string(),
                cost,
                approved: false,
                poll: None,
            },
        );
        object(json!({ "event": event }))
    }

    fn approve_event(&self, input: &Payload) -> Payload {
        let (Some(itinerary), Some(event)) = (text(input, "itinerary"), text(input, "event")) else {
            return error("itinerary and event are required.");
        };
        let approved = input.get("approved").and_then(|v| v.as_bool()).unwrap_or(true);

        let mut state = lock(&self.state);
        if let Err(e) = state.open_itinerary(itinerary) {
            return e;
        }
        match state.events.get_mut(event) {
            Some(ev) if ev.itinerary_id == itinerary => {
                ev.approved = approved;
                ok()
            }
            _ => error(format!("Event {event} not found in itinerary {itinerary}.")),
        }
    }

    fn attach_poll(&self, input: &Payload) -> Payload {
        let (Some(event), Some(poll)) = (text(input, "event"), text(input, "poll")) else {
            return error("event and poll are required.");
        };
        match lock(&self.state).events.get_mut(event) {
            Some(ev) => {
                ev.poll = Some(poll.to_string());
                ok()
            }
            None => error(format!("Event {event} not found.")),
        }
    }

    fn finalize(&self, input: &Payload) -> Payload {
        let Some(itinerary) = text(input, "itinerary") else {
            return error("itinerary is required.");
        };
        match lock(&self.state).open_itinerary(itinerary) {
            Ok(it) => {
                it.finalized = true;
                ok()
            }
            Err(e) => e,
        }
    }

    fn itinerary_rows(&self, matches: impl Fn(&Itinerary) -> bool) -> Result<Vec<Payload>> {
        lock(&self.state)
            .itineraries
            .values()
            .filter(|it| matches(*it))
            .map(|it| Ok(object(json!({ "itinerary": doc(it)? }))))
            .collect()
    }

    fn event_by_id(&self, input: &Payload) -> Result<Vec<Payload>> {
        let state = lock(&self.state);
        match text(input, "event").and_then(|id| state.events.get(id)) {
            Some(ev) => Ok(vec![object(json!({ "event": doc(ev)? }))]),
            None => Ok(Vec::new()),
        }
    }

    fn events_for(&self, input: &Payload, approved_only: bool) -> Result<Vec<Payload>> {
        let state = lock(&self.state);
        let Some(it) = text(input, "itinerary").and_then(|id| state.itineraries.get(id)) else {
            return Ok(Vec::new());
        };
        let events = it
            .events
            .iter()
            .filter_map(|id| state.events.get(id))
            .filter(|ev| !approved_only || ev.approved)
            .map(doc)
            .collect::<Result<Vec<_>>>()?;
        Ok(vec![object(json!({ "events": events }))])
    }
}

#[async_trait]
impl Concept for ItineraryPlanner {
    fn name(&self) -> &str {
        NAME
    }

    fn operations(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec::action("create").input(["trip"]).output(["itinerary"]),
            ActionSpec::action("addEvent")
                .input(["name", "cost", "itinerary"])
                .output(["event"]),
            ActionSpec::action("approveEvent").input(["event", "approved", "itinerary"]),
            ActionSpec::action("attachPollToEvent").input(["event", "poll"]),
            ActionSpec::action("finalizeItinerary").input(["itinerary"]),
            ActionSpec::query("_getItineraryByTrip").input(["trip"]).output(["itinerary"]),
            ActionSpec::query("_getItineraryById").input(["itinerary"]).output(["itinerary"]),
            ActionSpec::query("_getEventById").input(["event"]).output(["event"]),
            ActionSpec::query("_getAllEventsForItinerary")
                .input(["itinerary"])
                .output(["events"]),
            ActionSpec::query("_getApprovedEventsForItinerary")
                .input(["itinerary"])
                .output(["events"]),
        ]
    }

    async fn perform(&self, action: &str, input: Payload) -> Result<Payload> {
        Ok(match action {
            "create" => self.create(&input),
            "addEvent" => self.add_event(&input),
            "approveEvent" => self.approve_event(&input),
            "attachPollToEvent" => self.attach_poll(&input),
            "finalizeItinerary" => self.finalize(&input),
            other => anyhow::bail!("{NAME} has no action {other}"),
        })
    }

    async fn query(&self, query: &str, input: Payload) -> Result<Vec<Payload>> {
        match query {
            "_getItineraryByTrip" => {
                let trip = text(&input, "trip").unwrap_or_default();
                self.itinerary_rows(|it| it.trip == trip)
            }
            "_getItineraryById" => {
                let id = text(&input, "itinerary").unwrap_or_default();
                self.itinerary_rows(|it| it.id == id)
            }
            "_getEventById" => self.event_by_id(&input),
            "_getAllEventsForItinerary" => self.events_for(&input, false),
            "_getApprovedEventsForItinerary" => self.events_for(&input, true),
            other => anyhow::bail!("{NAME} has no query {other}"),
        }
    }
}
