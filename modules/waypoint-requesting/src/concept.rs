//! The Requesting concept: turns external calls into actions rules can match,
//! and holds each request's response until the caller collects it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;
use waypoint_engine::{ActionSpec, Concept, Payload};

use crate::config::RequestingConfig;

pub const NAME: &str = "Requesting";

struct Pending {
    path: String,
    opened: Instant,
    response: Option<Payload>,
    ready: Arc<Notify>,
}

impl Pending {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            opened: Instant::now(),
            response: None,
            ready: Arc::default(),
        }
    }
}

/// In-process request table. One entry per open request; the entry is
/// removed once its response has been collected or the wait timed out.
/// Entries nobody waits on are reaped once they are older than the timeout.
pub struct Requesting {
    config: RequestingConfig,
    pending: Mutex<HashMap<String, Pending>>,
}

impl Requesting {
    pub fn new(config: RequestingConfig) -> Self {
        Self {
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RequestingConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the table after dropping every expired entry.
    fn lock_reaped(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        let timeout = self.config.timeout();
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|_, entry| entry.opened.elapsed() < timeout);
        let reaped = before - pending.len();
        if reaped > 0 {
            debug!(reaped, "Reaped expired requests");
        }
        pending
    }

    /// Open a request. The input must carry a string `path`; every other
    /// field is passed through for rules to match on.
    pub fn request(&self, input: &Payload) -> Payload {
        let Some(path) = input.get("path").and_then(Value::as_str) else {
            return error_payload("path is required");
        };
        let request = Uuid::new_v4().to_string();
        self.lock_reaped().insert(request.clone(), Pending::new(path));
        debug!(request = request.as_str(), path, "Request opened");
        payload_of(json!({ "request": request }))
    }

    /// Attach a response to an open request. The first response wins.
    pub fn respond(&self, input: &Payload) -> Payload {
        let Some(request) = input.get("request").and_then(Value::as_str) else {
            return error_payload("request is required");
        };

        let mut pending = self.lock();
        let Some(entry) = pending.get_mut(request) else {
            return error_payload(&format!("Request {request} not found"));
        };
        if entry.response.is_some() {
            warn!(request, path = entry.path.as_str(), "Ignoring second response");
            return error_payload(&format!("Request {request} already has a response"));
        }

        let mut response = input.clone();
        response.remove("request");
        debug!(request, path = entry.path.as_str(), error = response.contains_key("error"), "Request answered");
        entry.response = Some(response);
        entry.ready.notify_one();

        payload_of(json!({ "request": request }))
    }

    /// Response of an open request, without collecting it.
    pub fn peek(&self, request: &str) -> Option<Payload> {
        self.lock().get(request).and_then(|p| p.response.clone())
    }

    pub fn open_requests(&self) -> usize {
        self.lock_reaped().len()
    }

    /// Wait for a request's response, up to the configured timeout counted
    /// from when the request was opened. The request is closed either way;
    /// expiry yields an error payload.
    pub async fn await_response(&self, request: &str) -> Payload {
        loop {
            let (ready, deadline) = {
                let mut pending = self.lock();
                let Some(entry) = pending.get_mut(request) else {
                    return error_payload(&format!("Request {request} not found"));
                };
                if let Some(response) = entry.response.take() {
                    pending.remove(request);
                    return response;
                }
                (entry.ready.clone(), entry.opened + self.config.timeout())
            };

            if tokio::time::timeout_at(deadline, ready.notified()).await.is_err() {
                let path = self.lock().remove(request).map(|p| p.path).unwrap_or_default();
                warn!(
                    request,
                    path = path.as_str(),
                    timeout_ms = self.config.timeout_ms,
                    "Request timed out without a response"
                );
                let mut timeout = error_payload(&format!("Request timed out after {}ms", self.config.timeout_ms));
                timeout.insert("status".into(), json!(504));
                return timeout;
            }
        }
    }
}

impl Default for Requesting {
    fn default() -> Self {
        Self::new(RequestingConfig::default())
    }
}

#[async_trait]
impl Concept for Requesting {
    fn name(&self) -> &str {
        NAME
    }

    fn operations(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec::action("request"),
            ActionSpec::action("respond"),
            ActionSpec::query("_awaitResponse").input(["request"]).output(["response"]),
            ActionSpec::query("_getResponse").input(["request"]).output(["response"]),
        ]
    }

    async fn perform(&self, action: &str, input: Payload) -> Result<Payload> {
        match action {
            "request" => Ok(self.request(&input)),
            "respond" => Ok(self.respond(&input)),
            other => anyhow::bail!("{NAME} has no action {other}"),
        }
    }

    async fn query(&self, query: &str, input: Payload) -> Result<Vec<Payload>> {
        match query {
            "_awaitResponse" => {
                let request = request_id(query, &input)?;
                let response = self.await_response(request).await;
                Ok(vec![payload_of(json!({ "response": response }))])
            }
            // No row until a response has been attached.
            "_getResponse" => {
                let request = request_id(query, &input)?;
                Ok(self
                    .peek(request)
                    .map(|response| payload_of(json!({ "response": response })))
                    .into_iter()
                    .collect())
            }
            other => anyhow::bail!("{NAME} has no query {other}"),
        }
    }
}

fn request_id<'a>(query: &str, input: &'a Payload) -> Result<&'a str> {
    input
        .get("request")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("{query} needs a request id"))
}

fn payload_of(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

pub(crate) fn error_payload(message: &str) -> Payload {
    payload_of(json!({ "error": message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn p(value: Value) -> Payload {
        payload_of(value)
    }

    fn quick() -> Requesting {
        Requesting::new(RequestingConfig::default().with_timeout_ms(30))
    }

    #[tokio::test]
    async fn response_is_collected_once() {
        let requesting = quick();
        let opened = requesting.request(&p(json!({"path": "/Trip/create", "name": "x"})));
        let id = opened["request"].as_str().unwrap().to_string();

        requesting.respond(&p(json!({"request": id, "tripId": "t1"})));
        assert_eq!(requesting.await_response(&id).await, p(json!({"tripId": "t1"})));
        assert_eq!(requesting.open_requests(), 0);
    }

    #[tokio::test]
    async fn waiter_wakes_on_later_response() {
        let requesting = Arc::new(Requesting::new(RequestingConfig::default().with_timeout_ms(1_000)));
        let id = requesting.request(&p(json!({"path": "/x"})))["request"]
            .as_str()
            .unwrap()
            .to_string();

        let responder = requesting.clone();
        let responder_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            responder.respond(&p(json!({"request": responder_id, "ok": true})));
        });

        assert_eq!(requesting.await_response(&id).await, p(json!({"ok": true})));
    }

    #[tokio::test]
    async fn unanswered_request_times_out_with_error() {
        let requesting = quick();
        let id = requesting.request(&p(json!({"path": "/x"})))["request"]
            .as_str()
            .unwrap()
            .to_string();

        let response = requesting.await_response(&id).await;
        assert!(response["error"].as_str().unwrap().contains("timed out"));
        assert_eq!(response["status"], json!(504));
        assert_eq!(requesting.open_requests(), 0);
    }

    #[test]
    fn first_response_wins() {
        let requesting = quick();
        let id = requesting.request(&p(json!({"path": "/x"})))["request"]
            .as_str()
            .unwrap()
            .to_string();

        assert!(!requesting.respond(&p(json!({"request": id, "a": 1}))).contains_key("error"));
        assert!(requesting.respond(&p(json!({"request": id, "a": 2}))).contains_key("error"));
        assert_eq!(requesting.peek(&id), Some(p(json!({"a": 1}))));
    }

    #[tokio::test]
    async fn uncollected_requests_are_reaped_after_the_timeout() {
        let requesting = quick();
        let stale = requesting.request(&p(json!({"path": "/x"})))["request"]
            .as_str()
            .unwrap()
            .to_string();
        requesting.respond(&p(json!({"request": stale, "ok": true})));

        tokio::time::sleep(Duration::from_millis(50)).await;
        requesting.request(&p(json!({"path": "/y"})));

        assert_eq!(requesting.open_requests(), 1);
        assert_eq!(requesting.peek(&stale), None);
    }

    #[tokio::test]
    async fn get_response_has_no_row_until_answered() {
        let requesting = quick();
        let id = requesting.request(&p(json!({"path": "/x"})))["request"]
            .as_str()
            .unwrap()
            .to_string();

        let input = p(json!({"request": id}));
        assert!(requesting.query("_getResponse", input.clone()).await.unwrap().is_empty());

        requesting.respond(&p(json!({"request": id, "ok": true})));
        let rows = requesting.query("_getResponse", input).await.unwrap();
        assert_eq!(rows, vec![p(json!({"response": {"ok": true}}))]);
    }

    #[test]
    fn malformed_calls_are_domain_errors() {
        let requesting = quick();
        assert!(requesting.request(&p(json!({"name": "x"}))).contains_key("error"));
        assert!(requesting.respond(&p(json!({"request": "missing"}))).contains_key("error"));
    }
}
