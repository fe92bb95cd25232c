use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use waypoint_engine::{ActionSpec, Concept, Payload};
use waypoint_requesting::SessionResolver;

use super::{error, fresh_id, lock, number, object, text};

pub const NAME: &str = "Session";

struct Entry {
    user: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Login sessions. Also resolves session tokens for the request gateway.
#[derive(Default)]
pub struct Session {
    sessions: Mutex<HashMap<String, Entry>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, input: &Payload) -> Payload {
        let Some(user) = text(input, "user") else {
            return error("user is required.");
        };
        let expires_at = number(input, "ttlSeconds")
            .filter(|ttl| *ttl > 0.0)
            .map(|ttl| Utc::now() + Duration::milliseconds((ttl * 1000.0) as i64));

        let session = fresh_id();
        lock(&self.sessions).insert(
            session.clone(),
            Entry {
                user: user.to_string(),
                expires_at,
            },
        );
        object(json!({ "session": session }))
    }

    /// The session's user, if it exists and has not expired. Expired
    /// sessions are dropped.
    pub fn user_of(&self, session: &str) -> Option<String> {
        let mut sessions = lock(&self.sessions);
        let expired = sessions
            .get(session)?
            .expires_at
            .is_some_and(|at| at < Utc::now());
        if expired {
            sessions.remove(session);
            return None;
        }
        sessions.get(session).map(|e| e.user.clone())
    }

    fn validate(&self, input: &Payload) -> Payload {
        match text(input, "session").and_then(|s| self.user_of(s)) {
            Some(user) => object(json!({ "user": user })),
            None => Payload::new(),
        }
    }

    fn destroy(&self, input: &Payload) -> Payload {
        if let Some(session) = text(input, "session") {
            lock(&self.sessions).remove(session);
        }
        object(json!({ "ok": true }))
    }
}

#[async_trait]
impl Concept for Session {
    fn name(&self) -> &str {
        NAME
    }

    fn operations(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec::action("create").input(["user", "ttlSeconds"]).output(["session"]),
            ActionSpec::action("validate").input(["session"]).output(["user"]),
            ActionSpec::action("destroy").input(["session"]).output(["ok"]),
        ]
    }

    async fn perform(&self, action: &str, input: Payload) -> Result<Payload> {
        Ok(match action {
            "create" => self.create(&input),
            "validate" => self.validate(&input),
            "destroy" => self.destroy(&input),
            other => anyhow::bail!("{NAME} has no action {other}"),
        })
    }
}

#[async_trait]
impl SessionResolver for Session {
    async fn resolve(&self, session: &str) -> Result<Option<String>> {
        Ok(self.user_of(session))
    }
}
