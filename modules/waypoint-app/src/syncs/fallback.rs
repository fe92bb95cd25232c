//! Answers requests that no other rule answered, so callers get a 404 instead
//! of waiting out the request timeout.

use anyhow::Result;
use serde_json::json;
use waypoint_engine::{lit, payload, Frames, Pattern, QueryFn, Registry, SyncSpec, Vars};

use super::respond;

/// Must be registered last. Rules for a completion run depth first in
/// registration order, so every other rule has had its chance to respond
/// by the time this one looks.
pub fn unhandled_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, path, error] = vars.many(["request", "path", "error"]);
    let response_of = reg.query("Requesting", "_getResponse")?;

    Ok(SyncSpec::new()
        .when(
            Pattern::new(reg.action("Requesting", "request")?)
                .input("path", path)
                .output("request", request),
        )
        .where_fn(move |frames| {
            let response_of = response_of.clone();
            async move {
                let mut unanswered = Frames::new();
                for frame in frames {
                    let input = payload(json!({ "request": frame.get(request) }))?;
                    if !response_of.call(input).await?.is_empty() {
                        continue;
                    }
                    let route = frame.get_str(path).unwrap_or_default().to_string();
                    unanswered.push(frame.with(error, format!("No handler for {route}")));
                }
                anyhow::Ok(unanswered)
            }
        })
        .then(
            respond(reg)?
                .input("request", request)
                .input("error", error)
                .input("status", lit(404)),
        ))
}
