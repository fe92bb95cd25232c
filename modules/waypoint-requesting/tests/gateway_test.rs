//! Gateway routing: passthrough calls, rule-answered requests, timeouts and
//! session-gated routes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use waypoint_engine::{
    lit, payload, ActionSpec, Concept, Engine, Pattern, Payload, Registry, SyncDef, SyncSpec, Vars,
};
use waypoint_requesting::{
    Gateway, PassthroughRoutes, Requesting, RequestingConfig, RouteKind, SessionResolver,
};

fn p(value: Value) -> Payload {
    payload(value).unwrap()
}

// ---------------------------------------------------------------------------
// A tiny notes concept
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Notes {
    notes: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl Concept for Notes {
    fn name(&self) -> &str {
        "Notes"
    }

    fn operations(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec::action("create").input(["title"]).output(["note"]),
            ActionSpec::action("delete").input(["note", "user"]),
            ActionSpec::query("_get").input(["note"]).output(["title"]),
        ]
    }

    async fn perform(&self, action: &str, input: Payload) -> Result<Payload> {
        let mut notes = self.notes.lock().unwrap();
        match action {
            "create" => match input.get("title").and_then(Value::as_str) {
                Some(title) if !title.is_empty() => {
                    let id = format!("note-{}", notes.len() + 1);
                    notes.insert(id.clone(), title.to_string());
                    Ok(p(json!({ "note": id })))
                }
                _ => Ok(p(json!({ "error": "title is required" }))),
            },
            "delete" => {
                let note = input.get("note").and_then(Value::as_str).unwrap_or_default();
                match notes.remove(note) {
                    Some(_) => Ok(p(json!({}))),
                    None => Ok(p(json!({ "error": format!("Note {note} not found") }))),
                }
            }
            other => anyhow::bail!("Notes has no action {other}"),
        }
    }

    async fn query(&self, query: &str, input: Payload) -> Result<Vec<Payload>> {
        anyhow::ensure!(query == "_get", "Notes has no query {query}");
        let notes = self.notes.lock().unwrap();
        Ok(input
            .get("note")
            .and_then(Value::as_str)
            .and_then(|id| notes.get(id))
            .map(|title| vec![p(json!({ "title": title }))])
            .unwrap_or_default())
    }
}

struct FixedSessions;

#[async_trait]
impl SessionResolver for FixedSessions {
    async fn resolve(&self, session: &str) -> Result<Option<String>> {
        Ok((session == "s-ana").then(|| "ana".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

fn create_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [title] = vars.many(["title"]);
    Ok(SyncSpec::new()
        .when(
            Pattern::new(reg.action("Requesting", "request")?)
                .input("path", lit("/Notes/create"))
                .input("title", title),
        )
        .then(Pattern::new(reg.action("Notes", "create")?).input("title", title)))
}

fn create_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, note] = vars.many(["request", "note"]);
    Ok(SyncSpec::new()
        .when(
            Pattern::new(reg.action("Requesting", "request")?)
                .input("path", lit("/Notes/create"))
                .output("request", request),
        )
        .when(Pattern::new(reg.action("Notes", "create")?).output("note", note))
        .then(
            Pattern::new(reg.action("Requesting", "respond")?)
                .input("request", request)
                .input("note", note),
        ))
}

fn create_response_error(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, error] = vars.many(["request", "error"]);
    Ok(SyncSpec::new()
        .when(
            Pattern::new(reg.action("Requesting", "request")?)
                .input("path", lit("/Notes/create"))
                .output("request", request),
        )
        .when(Pattern::new(reg.action("Notes", "create")?).output("error", error))
        .then(
            Pattern::new(reg.action("Requesting", "respond")?)
                .input("request", request)
                .input("error", error),
        ))
}

fn require_user(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, path, user] = vars.many(["request", "path", "user"]);
    Ok(SyncSpec::new()
        .when(
            Pattern::new(reg.action("Requesting", "request")?)
                .input("path", path)
                .input("user", user)
                .output("request", request),
        )
        .where_fn(move |frames| async move {
            anyhow::Ok(frames.filter(|f| f.get_str(path) == Some("/Notes/delete") && !f.is_present(user)))
        })
        .then(
            Pattern::new(reg.action("Requesting", "respond")?)
                .input("request", request)
                .input("error", lit("Unauthorized"))
                .input("status", lit(401)),
        ))
}

fn delete_request(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request, note, user] = vars.many(["request", "note", "user"]);
    Ok(SyncSpec::new()
        .when(
            Pattern::new(reg.action("Requesting", "request")?)
                .input("path", lit("/Notes/delete"))
                .input("note", note)
                .input("user", user)
                .output("request", request),
        )
        .where_fn(move |frames| async move { anyhow::Ok(frames.filter(|f| f.is_present(user))) })
        .then(
            Pattern::new(reg.action("Notes", "delete")?)
                .input("note", note)
                .input("user", user),
        ))
}

fn delete_response(vars: &mut Vars, reg: &Registry) -> Result<SyncSpec> {
    let [request] = vars.many(["request"]);
    Ok(SyncSpec::new()
        .when(
            Pattern::new(reg.action("Requesting", "request")?)
                .input("path", lit("/Notes/delete"))
                .output("request", request),
        )
        .when(Pattern::new(reg.action("Notes", "delete")?).succeeded())
        .then(
            Pattern::new(reg.action("Requesting", "respond")?)
                .input("request", request)
                .input("deleted", lit(true)),
        ))
}

const SYNCS: &[(&str, SyncDef)] = &[
    ("RequireUser", require_user),
    ("CreateNoteRequest", create_request),
    ("CreateNoteResponse", create_response),
    ("CreateNoteResponseError", create_response_error),
    ("DeleteNoteRequest", delete_request),
    ("DeleteNoteResponse", delete_response),
];

fn gateway(timeout_ms: u64) -> Gateway {
    let requesting = Arc::new(Requesting::new(
        RequestingConfig::default().with_timeout_ms(timeout_ms),
    ));
    let mut registry = Registry::new();
    registry.register(requesting.clone()).unwrap();
    registry.register(Arc::new(Notes::default())).unwrap();

    let engine = Engine::builder(registry).with_syncs(SYNCS).unwrap().build();
    let routes = PassthroughRoutes::new()
        .include("/api/Notes/_get", "notes are public")
        .include("/api/Requesting/request", "requests are public")
        .exclude("/api/Notes/create")
        .exclude("/api/Notes/delete");

    Gateway::new(Arc::new(engine), requesting, routes)
        .unwrap()
        .with_sessions(Arc::new(FixedSessions))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_is_answered_by_rules() {
    let gateway = gateway(1_000);

    let response = gateway
        .handle("/api/Notes/create", p(json!({"title": "packing list"})))
        .await
        .unwrap();

    assert_eq!(response.route, RouteKind::Requested);
    assert_eq!(response.body, json!({"note": "note-1"}));
    assert_eq!(response.status(), 200);

    let report = response.report.unwrap();
    assert_eq!(report.count("Requesting.respond"), 1);
    assert!(gateway.engine().persister().is_empty());
}

#[tokio::test]
async fn domain_error_is_answered_as_error() {
    let gateway = gateway(1_000);

    let response = gateway
        .handle("/api/Notes/create", p(json!({"title": ""})))
        .await
        .unwrap();

    assert_eq!(response.body, json!({"error": "title is required"}));
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn unanswered_request_times_out() {
    let gateway = gateway(30);

    // Missing title: no request rule matches, so nothing ever responds.
    let response = gateway
        .handle("/api/Notes/create", p(json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), 504);
    assert!(response.is_error());
}

#[tokio::test]
async fn included_query_is_called_directly() {
    let gateway = gateway(1_000);
    gateway
        .handle("/api/Notes/create", p(json!({"title": "tickets"})))
        .await
        .unwrap();

    let response = gateway
        .handle("/api/Notes/_get", p(json!({"note": "note-1"})))
        .await
        .unwrap();

    assert_eq!(response.route, RouteKind::Passthrough);
    assert_eq!(response.body, json!([{"title": "tickets"}]));
    assert!(response.report.is_none());
}

#[tokio::test]
async fn included_unknown_operation_is_not_found() {
    let requesting = Arc::new(Requesting::default());
    let mut registry = Registry::new();
    registry.register(requesting.clone()).unwrap();
    let engine = Engine::builder(registry).build();
    let routes = PassthroughRoutes::new().include("/api/Ghost/haunt", "testing");
    let gateway = Gateway::new(Arc::new(engine), requesting, routes).unwrap();

    let response = gateway.handle("/api/Ghost/haunt", Payload::new()).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn excluded_route_without_session_is_unauthorized() {
    let gateway = gateway(1_000);
    gateway
        .handle("/api/Notes/create", p(json!({"title": "secret"})))
        .await
        .unwrap();

    let response = gateway
        .handle("/api/Notes/delete", p(json!({"note": "note-1"})))
        .await
        .unwrap();

    assert_eq!(response.body, json!({"error": "Unauthorized", "status": 401}));
    let report = response.report.unwrap();
    assert_eq!(report.count("Notes.delete"), 0);
}

#[tokio::test]
async fn caller_supplied_user_is_not_trusted() {
    let gateway = gateway(1_000);
    gateway
        .handle("/api/Notes/create", p(json!({"title": "secret"})))
        .await
        .unwrap();

    let response = gateway
        .handle("/api/Notes/delete", p(json!({"note": "note-1", "user": "mallory"})))
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn verified_session_reaches_the_action() {
    let gateway = gateway(1_000);
    gateway
        .handle("/api/Notes/create", p(json!({"title": "secret"})))
        .await
        .unwrap();

    let response = gateway
        .handle("/api/Notes/delete", p(json!({"note": "note-1", "session": "s-ana"})))
        .await
        .unwrap();

    assert_eq!(response.body, json!({"deleted": true}));
    let report = response.report.unwrap();
    let delete = report.invocations_of("Notes.delete").next().unwrap();
    assert_eq!(delete.input["user"], json!("ana"));
}

#[tokio::test]
async fn passthrough_request_route_opens_a_request() {
    let gateway = gateway(1_000);

    let response = gateway
        .handle("/api/Requesting/request", p(json!({"path": "/Notes/create", "title": "x"})))
        .await
        .unwrap();

    assert_eq!(response.route, RouteKind::Passthrough);
    assert!(response.body["request"].is_string());
}
