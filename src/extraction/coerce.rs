//! Coercion of loosely-typed extractor payloads into [`ExtractionResult`].
//!
//! The collaborator's output is untrusted: lists may be missing or not lists,
//! items may lack names, values may be numbers or nested arrays. Everything is
//! normalized here so the rest of the crate only sees strict types.

use serde_json::{Map, Value};

use crate::error::ExtractionError;

use super::{EntityCandidate, EventCandidate, ExtractionResult, RelationshipCandidate};

const NAME_KEYS: &[&str] = &["name", "title"];
const TITLE_KEYS: &[&str] = &["title", "name"];
const SOURCE_KEYS: &[&str] = &["character_1", "source", "from"];
const TARGET_KEYS: &[&str] = &["character_2", "target", "to"];
const TYPE_KEYS: &[&str] = &["type", "relationship_type"];

/// Relationship type used when the payload gives none.
const DEFAULT_RELATIONSHIP_TYPE: &str = "related";

/// Removes a surrounding Markdown code fence, if any.
///
/// Text before an opening fence is also dropped, since completion models
/// sometimes preface the JSON with a sentence.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    let after_fence = &trimmed[start + 3..];
    // Skip the info string ("json") up to the end of the fence line.
    let body = match after_fence.find('\n') {
        Some(newline) => &after_fence[newline + 1..],
        None => after_fence,
    };
    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim()
}

/// Coerces a parsed payload into an [`ExtractionResult`].
///
/// # Errors
/// Returns [`ExtractionError::Malformed`] if the payload is not a JSON object.
pub fn coerce_payload(value: &Value) -> Result<ExtractionResult, ExtractionError> {
    let Value::Object(root) = value else {
        return Err(ExtractionError::Malformed(format!(
            "expected a JSON object, found {}",
            type_name(value)
        )));
    };

    Ok(ExtractionResult {
        characters: objects(root, "characters").filter_map(entity_candidate).collect(),
        locations: objects(root, "locations").filter_map(entity_candidate).collect(),
        events: objects(root, "events").filter_map(event_candidate).collect(),
        relationships: objects(root, "relationships").filter_map(relationship_candidate).collect(),
        summary: root.get("summary").and_then(scalar_string),
    })
}

fn objects<'a>(root: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Map<String, Value>> {
    root.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn entity_candidate(item: &Map<String, Value>) -> Option<EntityCandidate> {
    let (name_key, name) = first_string(item, NAME_KEYS)?;
    let mut candidate = EntityCandidate::new(name);

    for (key, value) in item {
        if key == name_key {
            continue;
        }
        let field = key.trim().to_lowercase();
        if field.is_empty() {
            continue;
        }
        if let Some(value) = field_value(value) {
            candidate.fields.insert(field, value);
        }
    }
    Some(candidate)
}

fn event_candidate(item: &Map<String, Value>) -> Option<EventCandidate> {
    let (_, title) = first_string(item, TITLE_KEYS)?;
    Some(EventCandidate {
        title,
        description: item.get("description").and_then(scalar_string),
        location: item.get("location").and_then(scalar_string),
        participants: item.get("participants").map(string_list).unwrap_or_default(),
    })
}

fn relationship_candidate(item: &Map<String, Value>) -> Option<RelationshipCandidate> {
    let (_, character_1) = first_string(item, SOURCE_KEYS)?;
    let (_, character_2) = first_string(item, TARGET_KEYS)?;
    let relationship_type = first_string(item, TYPE_KEYS)
        .map_or_else(|| DEFAULT_RELATIONSHIP_TYPE.to_string(), |(_, t)| t);

    Some(RelationshipCandidate {
        character_1,
        character_2,
        relationship_type,
        description: item.get("description").and_then(scalar_string),
    })
}

/// The first key in `keys` holding a usable string.
fn first_string<'k>(item: &Map<String, Value>, keys: &[&'k str]) -> Option<(&'k str, String)> {
    keys.iter()
        .find_map(|key| item.get(*key).and_then(scalar_string).map(|s| (*key, s)))
}

/// A trimmed, non-empty string from a scalar. Numbers and booleans are
/// stringified.
fn scalar_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// A descriptive field value. Arrays of scalars become JSON string lists.
fn field_value(value: &Value) -> Option<String> {
    match value {
        Value::Array(_) => {
            let items = string_list(value);
            if items.is_empty() {
                None
            } else {
                serde_json::to_string(&items).ok()
            }
        }
        other => scalar_string(other),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
