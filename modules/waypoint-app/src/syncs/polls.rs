//! Request handling for `/Polling/*`. Votes and poll lookups are passthrough
//! routes; creating and managing a poll acts as the verified user.

use anyhow::Result;
use waypoint_engine::{Pattern, Registry, SyncSpec, Vars};

use super::{request_to, respond};

const CREATE: &str = "/Polling/create";
const ADD_OPTION: &str = "/Polling/addOption";
const CLOSE: &str = "/Polling/close";

pub fn create_poll_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, name] = vars.many(["user", "name"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, CREATE)?.input("user", user).input("name", name))
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(
            Pattern::new(reg.action("Polling", "create")?)
                .input("user", user)
                .input("name", name),
        ))
}

pub fn create_poll_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, poll] = vars.many(["request", "poll"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, CREATE)?.output("request", request))
        .when(Pattern::new(reg.action("Polling", "create")?).output("poll", poll))
        .then(respond(reg)?.input("request", request).input("poll", poll)))
}

pub fn create_poll_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, CREATE)?.output("request", request))
        .when(Pattern::new(reg.action("Polling", "create")?).output("error", error))
        .then(respond(reg)?.input("request", request).input("error", error)))
}

/// Only the poll's creator may add options; the concept enforces it.
pub fn add_option_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, poll, label] = vars.many(["user", "poll", "label"]);
    Ok(SyncSpec::new()
        .when(
            request_to(reg, ADD_OPTION)?
                .input("user", user)
                .input("poll", poll)
                .input("label", label),
        )
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(
            Pattern::new(reg.action("Polling", "addOption")?)
                .input("actingUser", user)
                .input("poll", poll)
                .input("label", label),
        ))
}

pub fn add_option_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, poll, label] = vars.many(["request", "poll", "label"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, ADD_OPTION)?.output("request", request))
        .when(
            Pattern::new(reg.action("Polling", "addOption")?)
                .input("poll", poll)
                .input("label", label)
                .succeeded(),
        )
        .then(
            respond(reg)?
                .input("request", request)
                .input("poll", poll)
                .input("option", label),
        ))
}

pub fn add_option_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, ADD_OPTION)?.output("request", request))
        .when(Pattern::new(reg.action("Polling", "addOption")?).output("error", error))
        .then(respond(reg)?.input("request", request).input("error", error)))
}

pub fn close_poll_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [user, poll] = vars.many(["user", "poll"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, CLOSE)?.input("user", user).input("poll", poll))
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(
            Pattern::new(reg.action("Polling", "close")?)
                .input("actingUser", user)
                .input("poll", poll),
        ))
}

pub fn close_poll_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, poll] = vars.many(["request", "poll"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, CLOSE)?.output("request", request))
        .when(
            Pattern::new(reg.action("Polling", "close")?)
                .input("poll", poll)
                .succeeded(),
        )
        .then(respond(reg)?.input("request", request).input("closed", poll)))
}

pub fn close_poll_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(request_to(reg, CLOSE)?.output("request", request))
        .when(Pattern::new(reg.action("Polling", "close")?).output("error", error))
        .then(respond(reg)?.input("request", request).input("error", error)))
}
