use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use waypoint_engine::{ActionSpec, Concept, Payload};

use super::{doc, error, fresh_id, lock, object, ok, text};

pub const NAME: &str = "Polling";

#[derive(Debug, Clone, Serialize)]
struct Poll {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    creator: String,
    options: Vec<String>,
    /// user → option
    votes: BTreeMap<String, String>,
    closed: bool,
}

/// Named polls with options and one vote per user.
#[derive(Default)]
pub struct Polling {
    polls: Mutex<BTreeMap<String, Poll>>,
}

impl Polling {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, input: &Payload) -> Payload {
        let (Some(user), Some(name)) = (text(input, "user"), text(input, "name")) else {
            return error("user and name are required.");
        };
        let id = fresh_id();
        lock(&self.polls).insert(
            id.clone(),
            Poll {
                id: id.clone(),
                name: name.to_string(),
                creator: user.to_string(),
                options: Vec::new(),
                votes: BTreeMap::new(),
                closed: false,
            },
        );
        object(json!({ "poll": id }))
    }

    fn add_option(&self, input: &Payload) -> Payload {
        let (Some(user), Some(poll), Some(label)) = (
            text(input, "actingUser"),
            text(input, "poll"),
            text(input, "label"),
        ) else {
            return error("actingUser, poll and label are required.");
        };
        let mut polls = lock(&self.polls);
        let Some(poll) = polls.get_mut(poll) else {
            return error(format!("Poll {poll} not found."));
        };
        if poll.creator != user {
            return error("Only the poll creator can add options.");
        }
        if poll.options.iter().any(|o| o == label) {
            return error(format!("Option {label} already exists."));
        }
        poll.options.push(label.to_string());
        ok()
    }

    fn add_vote(&self, input: &Payload) -> Payload {
        let (Some(user), Some(poll), Some(option)) =
            (text(input, "user"), text(input, "poll"), text(input, "option"))
        else {
            return error("user, poll and option are required.");
        };
        let mut polls = lock(&self.polls);
        let Some(poll) = polls.get_mut(poll) else {
            return error(format!("Poll {poll} not found."));
        };
        if poll.closed {
            return error("Poll is closed.");
        }
        if !poll.options.iter().any(|o| o == option) {
            return error(format!("Option {option} is not part of this poll."));
        }
        poll.votes.insert(user.to_string(), option.to_string());
        ok()
    }

    fn close(&self, input: &Payload) -> Payload {
        let (Some(user), Some(poll)) = (text(input, "actingUser"), text(input, "poll")) else {
            return error("actingUser and poll are required.");
        };
        let mut polls = lock(&self.polls);
        match polls.get_mut(poll) {
            Some(p) if p.creator == user => {
                p.closed = true;
                ok()
            }
            Some(_) => error("Only the poll creator can close it."),
            None => error(format!("Poll {poll} not found.")),
        }
    }

    /// Looks a poll up by id, then by name.
    fn get_poll(&self, input: &Payload) -> Result<Vec<Payload>> {
        let Some(key) = text(input, "poll") else {
            return Ok(Vec::new());
        };
        let polls = lock(&self.polls);
        let found = polls.get(key).or_else(|| polls.values().find(|p| p.name == key));
        match found {
            Some(poll) => Ok(vec![object(json!({ "poll": doc(poll)? }))]),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl Concept for Polling {
    fn name(&self) -> &str {
        NAME
    }

    fn operations(&self) -> Vec<ActionSpec> {
        vec![
            ActionSpec::action("create").input(["user", "name"]).output(["poll"]),
            ActionSpec::action("addOption").input(["actingUser", "poll", "label"]),
            ActionSpec::action("addVote").input(["user", "poll", "option"]),
            ActionSpec::action("close").input(["actingUser", "poll"]),
            ActionSpec::query("_getPoll").input(["poll"]).output(["poll"]),
        ]
    }

    async fn perform(&self, action: &str, input: Payload) -> Result<Payload> {
        Ok(match action {
            "create" => self.create(&input),
            "addOption" => self.add_option(&input),
            "addVote" => self.add_vote(&input),
            "close" => self.close(&input),
            other => anyhow::bail!("{NAME} has no action {other}"),
        })
    }

    async fn query(&self, query: &str, input: Payload) -> Result<Vec<Payload>> {
        match query {
            "_getPoll" => self.get_poll(&input),
            other => anyhow::bail!("{NAME} has no query {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn p(value: Value) -> Payload {
        object(value)
    }

    #[test]
    fn votes_need_a_known_option_and_an_open_poll() {
        let polling = Polling::new();
        let poll = polling.create(&p(json!({"user": "ana", "name": "event-1"})))["poll"].clone();

        assert!(polling
            .add_option(&p(json!({"actingUser": "ben", "poll": poll, "label": "yes"})))
            .contains_key("error"));
        polling.add_option(&p(json!({"actingUser": "ana", "poll": poll, "label": "yes"})));

        assert!(polling
            .add_vote(&p(json!({"user": "ben", "poll": poll, "option": "maybe"})))
            .contains_key("error"));
        assert!(polling
            .add_vote(&p(json!({"user": "ben", "poll": poll, "option": "yes"})))
            .is_empty());

        polling.close(&p(json!({"actingUser": "ana", "poll": poll})));
        assert_eq!(
            polling.add_vote(&p(json!({"user": "cy", "poll": poll, "option": "yes"})))["error"],
            json!("Poll is closed.")
        );
    }

    #[test]
    fn polls_are_found_by_name() {
        let polling = Polling::new();
        polling.create(&p(json!({"user": "ana", "name": "event-42"})));

        let rows = polling.get_poll(&p(json!({"poll": "event-42"}))).unwrap();
        assert_eq!(rows[0]["poll"]["creator"], json!("ana"));
    }
}
