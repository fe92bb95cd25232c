//! Operation payloads and the success/error split.

use serde_json::Value;

use crate::error::EngineError;
use crate::Payload;

/// Build a payload from a JSON object literal.
///
/// Non-object values are rejected; operations always take and return objects.
pub fn payload(value: Value) -> Result<Payload, EngineError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(EngineError::InvalidPayload(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// The result of an operation, tagged by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Payload),
    /// Carries an `error` field. Ordinary data to the engine.
    Error(Payload),
}

impl Outcome {
    pub fn is_error_payload(payload: &Payload) -> bool {
        payload.contains_key("error")
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn payload(&self) -> &Payload {
        match self {
            Outcome::Success(p) | Outcome::Error(p) => p,
        }
    }

    pub fn into_payload(self) -> Payload {
        match self {
            Outcome::Success(p) | Outcome::Error(p) => p,
        }
    }

    /// The `error` field rendered as text, if this is an error outcome.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Outcome::Error(p) => p.get("error").map(|e| match e {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            Outcome::Success(_) => None,
        }
    }
}

impl From<Payload> for Outcome {
    fn from(payload: Payload) -> Self {
        if Outcome::is_error_payload(&payload) {
            Outcome::Error(payload)
        } else {
            Outcome::Success(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_become_payloads() {
        let p = payload(json!({"a": 1})).unwrap();
        assert_eq!(p.get("a"), Some(&json!(1)));
        assert!(payload(json!([1, 2])).is_err());
    }

    #[test]
    fn error_field_tags_the_outcome() {
        let ok = Outcome::from(payload(json!({"tripId": "t1"})).unwrap());
        let err = Outcome::from(payload(json!({"error": "Trip not found"})).unwrap());
        assert!(!ok.is_error());
        assert!(err.is_error());
        assert_eq!(err.error_message().as_deref(), Some("Trip not found"));
        assert_eq!(ok.error_message(), None);
    }
}
