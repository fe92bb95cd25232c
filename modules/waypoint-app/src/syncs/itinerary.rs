//! Request handling for `/ItineraryPlanner/*`.

use anyhow::Result;
use waypoint_engine::{Pattern, Registry, SyncSpec, Vars};

use super::{lookup, request_to, respond};

const CREATE: &str = "/ItineraryPlanner/create";
const ADD_EVENT: &str = "/ItineraryPlanner/addEvent";
const APPROVE_EVENT: &str = "/ItineraryPlanner/approveEvent";
const FINALIZE: &str = "/ItineraryPlanner/finalizeItinerary";

pub fn create_itinerary_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, trip] = vars.many(["user", "trip"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, CREATE)?.input("user", user).input("trip", trip))
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(Pattern::new(reg.action("ItineraryPlanner", "create")?).input("trip", trip)))
}

pub fn create_itinerary_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, itinerary] = vars.many(["request", "itinerary"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, CREATE)?.output("request", request))
        .when(
            Pattern::new(reg.action("ItineraryPlanner", "create")?).output("itinerary", itinerary),
        )
        .then(
            respond(reg)?
                .input("request", request)
                .input("itinerary", itinerary),
        ))
}

pub fn create_itinerary_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, CREATE)?.output("request", request))
        .when(Pattern::new(reg.action("ItineraryPlanner", "create")?).output("error", error))
        .then(respond(reg)?.input("request", request).input("error", error)))
}

pub fn add_event_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, name, cost, itinerary] = vars.many(["user", "name", "cost", "itinerary"]);
    Ok(SyncSpec::new()
        .when(
            request_to(reg, ADD_EVENT)?
                .input("user", user)
                .input("name", name)
                .input("cost", cost)
                .input("itinerary", itinerary),
        )
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(
            Pattern::new(reg.action("ItineraryPlanner", "addEvent")?)
                .input("name", name)
                .input("cost", cost)
                .input("itinerary", itinerary),
        ))
}

/// Answers once the event exists. The poll rules have already run by then,
/// so the caller can look the poll up straight away.
pub fn add_event_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, event] = vars.many(["request", "event"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, ADD_EVENT)?.output("request", request))
        .when(Pattern::new(reg.action("ItineraryPlanner", "addEvent")?).output("event", event))
        .then(respond(reg)?.input("request", request).input("event", event)))
}

pub fn add_event_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, ADD_EVENT)?.output("request", request))
        .when(Pattern::new(reg.action("ItineraryPlanner", "addEvent")?).output("error", error))
        .then(respond(reg)?.input("request", request).input("error", error)))
}

/// `approved: false` withdraws an approval; only `true` records an expense.
pub fn approve_event_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, event, approved, itinerary] = vars.many(["user", "event", "approved", "itinerary"]);
    Ok(SyncSpec::new()
        .when(
            request_to(reg, APPROVE_EVENT)?
                .input("user", user)
                .input("event", event)
                .input("approved", approved)
                .input("itinerary", itinerary),
        )
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(
            Pattern::new(reg.action("ItineraryPlanner", "approveEvent")?)
                .input("event", event)
                .input("approved", approved)
                .input("itinerary", itinerary),
        ))
}

pub fn approve_event_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, event, approved] = vars.many(["request", "event", "approved"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, APPROVE_EVENT)?.output("request", request))
        .when(
            Pattern::new(reg.action("ItineraryPlanner", "approveEvent")?)
                .input("event", event)
                .input("approved", approved)
                .succeeded(),
        )
        .then(
            respond(reg)?
                .input("request", request)
                .input("event", event)
                .input("approved", approved),
        ))
}

pub fn approve_event_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, APPROVE_EVENT)?.output("request", request))
        .when(
            Pattern::new(reg.action("ItineraryPlanner", "approveEvent")?).output("error", error),
        )
        .then(respond(reg)?.input("request", request).input("error", error)))
}

pub fn finalize_itinerary_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, itinerary] = vars.many(["user", "itinerary"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, FINALIZE)?.input("user", user).input("itinerary", itinerary))
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(
            Pattern::new(reg.action("ItineraryPlanner", "finalizeItinerary")?)
                .input("itinerary", itinerary),
        ))
}

pub fn finalize_itinerary_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, itinerary] = vars.many(["request", "itinerary"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, FINALIZE)?.output("request", request))
        .when(
            Pattern::new(reg.action("ItineraryPlanner", "finalizeItinerary")?)
                .input("itinerary", itinerary)
                .succeeded(),
        )
        .then(respond(reg)?.input("request", request).input("finalized", itinerary)))
}

pub fn finalize_itinerary_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, FINALIZE)?.output("request", request))
        .when(
            Pattern::new(reg.action("ItineraryPlanner", "finalizeItinerary")?)
                .output("error", error),
        )
        .then(respond(reg)?.input("request", request).input("error", error)))
}

pub fn get_itinerary_by_trip(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    lookup(vars, reg, "ItineraryPlanner", "_getItineraryByTrip", "trip", "itinerary")
}

pub fn get_itinerary_by_id(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    lookup(vars, reg, "ItineraryPlanner", "_getItineraryById", "itinerary", "itinerary")
}

pub fn get_event_by_id(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    lookup(vars, reg, "ItineraryPlanner", "_getEventById", "event", "event")
}

pub fn get_all_events_for_itinerary(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    lookup(vars, reg, "ItineraryPlanner", "_getAllEventsForItinerary", "itinerary", "events")
}

pub fn get_approved_events_for_itinerary(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    lookup(vars, reg, "ItineraryPlanner", "_getApprovedEventsForItinerary", "itinerary", "events")
}
