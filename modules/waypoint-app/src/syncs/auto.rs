//! Background wiring between concepts. These fire regardless of how the
//! triggering action was invoked.

use anyhow::Result;
use serde_json::Value;
use waypoint_engine::{lit, Pattern, Registry, SyncSpec, Vars};

/// A new trip gets an itinerary.
pub fn create_itinerary_for_trip(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [trip_id] = vars.many(["tripId"]);
    Ok(SyncSpec::new()
        .when(Pattern::new(reg.action("TripPlanning", "create")?).output("tripId", trip_id))
        .then(Pattern::new(reg.action("ItineraryPlanner", "create")?).input("trip", trip_id)))
}

/// A new event gets a poll named `event-<id>`, created by the trip owner.
/// Walks event → itinerary → trip to find the owner.
pub fn create_poll_for_event(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [event, event_doc, itinerary, itinerary_doc, trip_id, trip_doc, poll_name, trip_owner] = vars.many([
        "event",
        "eventDoc",
        "itinerary",
        "itineraryDoc",
        "tripId",
        "tripDoc",
        "pollName",
        "tripOwner",
    ]);
    let event_by_id = reg.query("ItineraryPlanner", "_getEventById")?;
    let itinerary_by_id = reg.query("ItineraryPlanner", "_getItineraryById")?;
    let trip_by_id = reg.query("TripPlanning", "_getTripById")?;

    Ok(SyncSpec::new()
        .when(
            Pattern::new(reg.action("ItineraryPlanner", "addEvent")?)
                .input("itinerary", itinerary)
                .output("event", event),
        )
        .where_fn(move |frames| {
            let (event_by_id, itinerary_by_id, trip_by_id) =
                (event_by_id.clone(), itinerary_by_id.clone(), trip_by_id.clone());
            async move {
                let frames = frames
                    .query(&event_by_id, [("event", event)], [("event", event_doc)])
                    .await?
                    .filter(|f| f.get(event_doc).and_then(|d| d.get("itineraryId")) == f.get(itinerary));
                let frames = frames
                    .query(&itinerary_by_id, [("itinerary", itinerary)], [("itinerary", itinerary_doc)])
                    .await?
                    .map(|f| {
                        let trip = field(&f, itinerary_doc, "trip");
                        f.with(trip_id, trip)
                    });
                let frames = frames
                    .query(&trip_by_id, [("tripId", trip_id)], [("trip", trip_doc)])
                    .await?
                    .map(|f| {
                        let owner = field(&f, trip_doc, "owner");
                        let name = format!("event-{}", f.get_str(event).unwrap_or_default());
                        f.with(trip_owner, owner).with(poll_name, name)
                    });
                anyhow::Ok(frames)
            }
        })
        .then(
            Pattern::new(reg.action("Polling", "create")?)
                .input("user", trip_owner)
                .input("name", poll_name),
        ))
}

/// An event and a poll created in the same flow are linked.
pub fn attach_poll_to_event(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [event, poll] = vars.many(["event", "poll"]);
    Ok(SyncSpec::new()
        .when(Pattern::new(reg.action("ItineraryPlanner", "addEvent")?).output("event", event))
        .when(Pattern::new(reg.action("Polling", "create")?).output("poll", poll))
        .then(
            Pattern::new(reg.action("ItineraryPlanner", "attachPollToEvent")?)
                .input("event", event)
                .input("poll", poll),
        ))
}

/// An approved event becomes an expense for its cost.
pub fn create_expense_for_approved_event(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [event, event_doc, cost] = vars.many(["event", "eventDoc", "cost"]);
    let event_by_id = reg.query("ItineraryPlanner", "_getEventById")?;

    Ok(SyncSpec::new()
        .when(
            Pattern::new(reg.action("ItineraryPlanner", "approveEvent")?)
                .input("event", event)
                .input("approved", lit(true))
                .succeeded(),
        )
        .where_fn(move |frames| {
            let event_by_id = event_by_id.clone();
            async move {
                let frames = frames
                    .query(&event_by_id, [("event", event)], [("event", event_doc)])
                    .await?
                    .map(|f| {
                        let amount = field(&f, event_doc, "cost");
                        f.with(cost, amount)
                    });
                anyhow::Ok(frames)
            }
        })
        .then(
            Pattern::new(reg.action("CostSplitting", "create")?)
                .input("item", event)
                .input("cost", cost),
        ))
}

/// A field of a document bound in the frame, or null.
fn field(frame: &waypoint_engine::Frame, doc: waypoint_engine::Var, name: &str) -> Value {
    frame
        .get(doc)
        .and_then(|d| d.get(name))
        .cloned()
        .unwrap_or(Value::Null)
}
