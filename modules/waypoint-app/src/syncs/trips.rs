//! Request handling for `/TripPlanning/*`.

use anyhow::Result;
use serde_json::Value;
use waypoint_engine::{payload, Frames, Pattern, QueryFn, Registry, SyncSpec, Vars};

use super::{lookup, request_to, respond};

const CREATE: &str = "/TripPlanning/create";
const DELETE: &str = "/TripPlanning/delete";
const ADD_PARTICIPANT: &str = "/TripPlanning/addParticipant";

/// The verified user becomes the trip owner.
pub fn create_trip_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, name, destination, date_range] =
        vars.many(["user", "name", "destination", "dateRange"]);
    Ok(SyncSpec::new()
        .when(
            request_to(reg, CREATE)?
                .input("user", user)
                .input("name", name)
                .input("destination", destination)
                .input("dateRange", date_range),
        )
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(
            Pattern::new(reg.action("TripPlanning", "create")?)
                .input("owner", user)
                .input("name", name)
                .input("destination", destination)
                .input("dateRange", date_range),
        ))
}

pub fn create_trip_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, trip_id] = vars.many(["request", "tripId"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, CREATE)?.output("request", request))
        .when(Pattern::new(reg.action("TripPlanning", "create")?).output("tripId", trip_id))
        .then(respond(reg)?.input("request", request).input("tripId", trip_id)))
}

pub fn create_trip_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, CREATE)?.output("request", request))
        .when(Pattern::new(reg.action("TripPlanning", "create")?).output("error", error))
        .then(respond(reg)?.input("request", request).input("error", error)))
}

pub fn delete_trip_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, trip_id] = vars.many(["user", "tripId"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, DELETE)?.input("user", user).input("tripId", trip_id))
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(
            Pattern::new(reg.action("TripPlanning", "delete")?)
                .input("owner", user)
                .input("tripId", trip_id),
        ))
}

pub fn delete_trip_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, trip_id] = vars.many(["request", "tripId"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, DELETE)?.output("request", request))
        .when(
            Pattern::new(reg.action("TripPlanning", "delete")?)
                .input("tripId", trip_id)
                .succeeded(),
        )
        .then(respond(reg)?.input("request", request).input("deleted", trip_id)))
}

pub fn delete_trip_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, DELETE)?.output("request", request))
        .when(Pattern::new(reg.action("TripPlanning", "delete")?).output("error", error))
        .then(respond(reg)?.input("request", request).input("error", error)))
}

pub fn add_participant_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, trip_id, participant] = vars.many(["user", "tripId", "participant"]);
    Ok(SyncSpec::new()
        .when(
            request_to(reg, ADD_PARTICIPANT)?
                .input("user", user)
                .input("tripId", trip_id)
                .input("participant", participant),
        )
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(
            Pattern::new(reg.action("TripPlanning", "addParticipant")?)
                .input("owner", user)
                .input("tripId", trip_id)
                .input("participant", participant),
        ))
}

pub fn add_participant_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, participant] = vars.many(["request", "participant"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, ADD_PARTICIPANT)?.output("request", request))
        .when(
            Pattern::new(reg.action("TripPlanning", "addParticipant")?)
                .input("participant", participant)
                .succeeded(),
        )
        .then(respond(reg)?.input("request", request).input("added", participant)))
}

pub fn add_participant_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, ADD_PARTICIPANT)?.output("request", request))
        .when(Pattern::new(reg.action("TripPlanning", "addParticipant")?).output("error", error))
        .then(respond(reg)?.input("request", request).input("error", error)))
}

/// Unknown trips are answered with `trip: null` rather than left to time out.
pub fn get_trip_by_id(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    lookup(vars, reg, "TripPlanning", "_getTripById", "tripId", "trip")
}

/// Collects every trip the user takes part in into one response.
pub fn get_trips_by_user(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, user, trips] = vars.many(["request", "user", "trips"]);
    let trips_by_user = reg.query("TripPlanning", "_getTripsByUser")?;

    Ok(SyncSpec::new()
        .when(
            request_to(reg, "/TripPlanning/_getTripsByUser")?
                .input("user", user)
                .output("request", request),
        )
        .where_fn(move |frames| {
            let trips_by_user = trips_by_user.clone();
            async move {
                let mut collected = Frames::new();
                for frame in frames.filter(|f| f.is_present(user)) {
                    let input = payload(serde_json::json!({ "user": frame.get(user) }))?;
                    let rows = trips_by_user.call(input).await?;
                    let list: Vec<Value> = rows
                        .into_iter()
                        .filter_map(|mut row| row.remove("trip"))
                        .collect();
                    collected.push(frame.with(trips, list));
                }
                anyhow::Ok(collected)
            }
        })
        .then(respond(reg)?.input("request", request).input("trips", trips)))
}

pub fn get_participants_in_trip(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    lookup(vars, reg, "TripPlanning", "_getParticipantsInTrip", "tripId", "participants")
}
