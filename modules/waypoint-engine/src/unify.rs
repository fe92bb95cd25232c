//! Matching one completion against one pattern.

use serde_json::{Number, Value};

use crate::frame::Frame;
use crate::pattern::{Pattern, Template, Term};
use crate::registry::ActionId;
use crate::Payload;

/// Match a completed invocation of `action` against `pattern`.
///
/// Yields a fresh frame holding every binding the pattern introduced, or
/// `None` when the action differs, the outcome shape is not admitted, a
/// literal disagrees, a mentioned field is absent, or one variable would
/// need two different values.
pub fn unify(action: ActionId, input: &Payload, output: &Payload, pattern: &Pattern) -> Option<Frame> {
    if pattern.action != action {
        return None;
    }
    if !pattern.outcome.admits(output) {
        return None;
    }

    let mut frame = Frame::new();
    if !match_template(&mut frame, &pattern.input, input) {
        return None;
    }
    if !match_template(&mut frame, &pattern.output, output) {
        return None;
    }
    Some(frame)
}

/// Extend `frame` with the bindings `template` demands of `payload`.
///
/// On failure `frame` may hold partial bindings; callers discard it.
pub fn match_template(frame: &mut Frame, template: &Template, payload: &Payload) -> bool {
    template.iter().all(|(field, term)| {
        let Some(actual) = payload.get(field) else {
            return false;
        };
        match term {
            Term::Var(var) => frame.bind(*var, actual),
            Term::Lit(expected) => literal_eq(expected, actual),
        }
    })
}

fn literal_eq(expected: &Value, actual: &Value) -> bool {
    values_equal(expected, actual)
}

/// Structural equality where numbers compare by value, so `1` matches `1.0`.
/// Integers compare exactly and are never widened to `f64`.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    match (integer(a), integer(b)) {
        (Some(x), Some(y)) => x == y,
        (Some(x), None) => float_is(b.as_f64(), x),
        (None, Some(y)) => float_is(a.as_f64(), y),
        (None, None) => a.as_f64() == b.as_f64(),
    }
}

fn integer(n: &Number) -> Option<i128> {
    n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from))
}

fn float_is(float: Option<f64>, int: i128) -> bool {
    float.is_some_and(|f| f.fract() == 0.0 && f.abs() <= u64::MAX as f64 && f as i128 == int)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::lit;
    use crate::vars::Vars;
    use serde_json::json;

    fn p(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    const X: ActionId = ActionId::from_raw(0);
    const Y: ActionId = ActionId::from_raw(1);

    #[test]
    fn binds_input_and_output_variables() {
        let [a, b] = Vars::new().many(["a", "b"]);
        let pattern = Pattern::new(X).input("a", a).output("b", b);

        let frame = unify(X, &p(json!({"a": 1, "extra": true})), &p(json!({"b": 7})), &pattern).unwrap();
        assert_eq!(frame.get(a), Some(&json!(1)));
        assert_eq!(frame.get(b), Some(&json!(7)));
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn different_action_never_matches() {
        let pattern = Pattern::new(X);
        assert!(unify(Y, &Payload::new(), &Payload::new(), &pattern).is_none());
        assert!(unify(X, &Payload::new(), &Payload::new(), &pattern).is_some());
    }

    #[test]
    fn missing_output_field_fails() {
        let [a, b] = Vars::new().many(["a", "b"]);
        let pattern = Pattern::new(X).input("a", a).output("b", b);
        assert!(unify(X, &p(json!({"a": 1})), &p(json!({"c": 7})), &pattern).is_none());
    }

    #[test]
    fn literals_must_agree() {
        let [request] = Vars::new().many(["request"]);
        let pattern = Pattern::new(X)
            .input("path", lit("/TripPlanning/create"))
            .output("request", request);

        let hit = unify(
            X,
            &p(json!({"path": "/TripPlanning/create"})),
            &p(json!({"request": "r1"})),
            &pattern,
        );
        let miss = unify(
            X,
            &p(json!({"path": "/TripPlanning/delete"})),
            &p(json!({"request": "r1"})),
            &pattern,
        );
        assert_eq!(hit.and_then(|f| f.get(request).cloned()), Some(json!("r1")));
        assert!(miss.is_none());
    }

    #[test]
    fn numeric_literals_compare_by_value() {
        let pattern = Pattern::new(X).input("approved", lit(1));
        assert!(unify(X, &p(json!({"approved": 1.0})), &Payload::new(), &pattern).is_some());
    }

    #[test]
    fn large_integers_are_not_rounded() {
        let big = 9_007_199_254_740_993_u64;
        assert!(!values_equal(&json!(big), &json!(big - 1)));
        assert!(!values_equal(&json!(big), &json!(9_007_199_254_740_992.0)));
        assert!(values_equal(&json!(big), &json!(big)));
        assert!(values_equal(&json!(-3), &json!(-3.0)));
        assert!(values_equal(&json!({"cost": [1, 2]}), &json!({"cost": [1.0, 2.0]})));
    }

    #[test]
    fn variables_unify_numbers_by_value() {
        let [n] = Vars::new().many(["n"]);
        let pattern = Pattern::new(X).input("n", n).output("n", n);
        assert!(unify(X, &p(json!({"n": 2})), &p(json!({"n": 2.0})), &pattern).is_some());
        assert!(unify(X, &p(json!({"n": 2})), &p(json!({"n": 2.5})), &pattern).is_none());
    }

    #[test]
    fn repeated_variable_requires_equal_values() {
        let [id] = Vars::new().many(["id"]);
        let pattern = Pattern::new(X).input("id", id).output("id", id);

        assert!(unify(X, &p(json!({"id": "a"})), &p(json!({"id": "a"})), &pattern).is_some());
        assert!(unify(X, &p(json!({"id": "a"})), &p(json!({"id": "b"})), &pattern).is_none());
    }

    #[test]
    fn error_template_only_matches_error_outcomes() {
        let [error] = Vars::new().many(["error"]);
        let pattern = Pattern::new(X).output("error", error);

        let err = unify(X, &Payload::new(), &p(json!({"error": "boom"})), &pattern).unwrap();
        assert_eq!(err.get(error), Some(&json!("boom")));
        assert!(unify(X, &Payload::new(), &p(json!({"tripId": "t"})), &pattern).is_none());
    }

    #[test]
    fn empty_output_matches_both_shapes_unless_restricted() {
        let any = Pattern::new(X);
        let ok_only = Pattern::new(X).succeeded();
        let failure = p(json!({"error": "boom"}));

        assert!(unify(X, &Payload::new(), &failure, &any).is_some());
        assert!(unify(X, &Payload::new(), &failure, &ok_only).is_none());
        assert!(unify(X, &Payload::new(), &Payload::new(), &ok_only).is_some());
    }
}
