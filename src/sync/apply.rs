//! Action semantics on a JSON state object.

use serde_json::{Map, Value};

use super::Action;
use crate::core::{PeerId, UpdateError};

/// Check that `payload` has the shape `action` needs.
pub fn validate(action: Action, payload: &Value) -> Result<(), UpdateError> {
    match action {
        Action::PlayerMove | Action::GameState => {
            if payload.is_object() {
                Ok(())
            } else {
                Err(UpdateError::ApplyFailed(format!(
                    "{action} expects an object, got {}",
                    kind_of(payload)
                )))
            }
        }
        Action::GameEvent => Ok(()),
        Action::ScoreUpdate => match payload.get("score") {
            Some(_) => Ok(()),
            None => Err(UpdateError::ApplyFailed(
                "score_update requires a `score` field".into(),
            )),
        },
    }
}

/// Apply one update to `state`.
///
/// `state` is coerced to an object if it is not one; a target field that
/// exists with the wrong type is replaced.
pub fn apply(
    state: &mut Value,
    origin: &PeerId,
    action: Action,
    payload: &Value,
) -> Result<(), UpdateError> {
    validate(action, payload)?;
    let root = object_mut(state);

    match action {
        Action::PlayerMove => {
            let players = object_mut(root.entry("players").or_insert_with(empty_object));
            let player = object_mut(
                players
                    .entry(origin.as_str())
                    .or_insert_with(empty_object),
            );
            merge(player, payload);
        }
        Action::GameEvent => {
            let events = root
                .entry("events")
                .or_insert_with(|| Value::Array(Vec::new()));
            if !events.is_array() {
                *events = Value::Array(Vec::new());
            }
            if let Value::Array(events) = events {
                events.push(payload.clone());
            }
        }
        Action::ScoreUpdate => {
            let score = payload.get("score").cloned().unwrap_or(Value::Null);
            let scores = object_mut(root.entry("scores").or_insert_with(empty_object));
            scores.insert(origin.as_str().to_string(), score);
        }
        Action::GameState => merge(root, payload),
    }
    Ok(())
}

/// Drop from `payload` every top-level key present in `taken`.
pub fn strip_keys(payload: &Value, taken: &Map<String, Value>) -> Value {
    match payload {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(key, _)| !taken.contains_key(*key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// An empty state object.
pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn merge(target: &mut Map<String, Value>, payload: &Value) {
    if let Value::Object(fields) = payload {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = empty_object();
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("coerced to an object above"),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
