//! Mapping between story drafts/records and the flat wire hash.
//!
//! Writes always flatten `storyContent` and `images` to JSON text. Reads go
//! through a two-stage decode: strict first, then a fixed list of per-field
//! coercions and a second strict attempt, and finally the repaired hash as an
//! unvalidated record.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::model::{is_json_text, Nested, Story, StoryDraft, StoryRecord};
use crate::kv::Fields;

pub const STORY_CONTENT_FALLBACK: &str = "{}";
pub const IMAGES_FALLBACK: &str = "[]";

/// Fields whose stored value must be JSON text, with their placeholders.
const JSON_FIELDS: [(&str, &str); 2] = [
    ("storyContent", STORY_CONTENT_FALLBACK),
    ("images", IMAGES_FALLBACK),
];

/// Plain text fields; a non-string here is rendered as its JSON text.
const TEXT_FIELDS: [&str; 8] = [
    "id",
    "title",
    "prompt",
    "age",
    "createdAt",
    "completedAt",
    "deletionToken",
    "error",
];

/// Stringify-if-not-string. Encoded text that is not valid JSON, or a value
/// that fails to serialize, is replaced by `fallback` and logged; the error
/// never reaches the caller.
pub fn encode_nested<T: Serialize>(field: &str, value: &Nested<T>, fallback: &str) -> String {
    match value {
        Nested::Encoded(text) if is_json_text(text) => text.clone(),
        Nested::Encoded(_) => {
            warn!(field, "nested story field is not valid JSON text; storing placeholder");
            fallback.to_string()
        }
        Nested::Value(v) => match serde_json::to_string(v) {
            Ok(text) => text,
            Err(e) => {
                warn!(field, error = %e, "failed to serialize nested story field; storing placeholder");
                fallback.to_string()
            }
        },
    }
}

/// Flatten the provided draft fields into the wire hash.
pub fn draft_to_fields(draft: &StoryDraft) -> Fields {
    let mut fields = Fields::new();
    let mut put = |name: &str, value: Option<String>| {
        if let Some(value) = value {
            fields.insert(name.to_string(), Value::String(value));
        }
    };

    put("id", draft.id.clone());
    put("title", draft.title.clone());
    put("prompt", draft.prompt.clone());
    put("age", draft.age.clone());
    put("status", draft.status.map(|s| s.as_str().to_string()));
    put("visibility", draft.visibility.map(|v| v.as_str().to_string()));
    put(
        "storyContent",
        draft
            .story_content
            .as_ref()
            .map(|c| encode_nested("storyContent", c, STORY_CONTENT_FALLBACK)),
    );
    put(
        "images",
        draft.images.as_ref().map(|i| encode_nested("images", i, IMAGES_FALLBACK)),
    );
    put("createdAt", draft.created_at.clone());
    put("completedAt", draft.completed_at.clone());
    put("deletionToken", draft.deletion_token.clone());
    put("error", draft.error.clone());
    fields
}

/// Apply the enumerated coercions. Returns the repaired hash and the names
/// of the fields that changed.
pub fn repair(mut fields: Fields) -> (Fields, Vec<String>) {
    let mut coerced = Vec::new();

    let nulls: Vec<String> = fields
        .iter()
        .filter(|(_, v)| v.is_null())
        .map(|(k, _)| k.clone())
        .collect();
    for name in nulls {
        fields.remove(&name);
        coerced.push(name);
    }

    for (name, fallback) in JSON_FIELDS {
        let Some(value) = fields.get_mut(name) else { continue };
        let text = match &*value {
            Value::String(text) if is_json_text(text) => continue,
            // JSON text that does not parse cannot be recovered
            Value::String(_) => fallback.to_string(),
            other => serde_json::to_string(other).unwrap_or_else(|_| fallback.to_string()),
        };
        *value = Value::String(text);
        coerced.push(name.to_string());
    }

    for name in TEXT_FIELDS {
        let Some(value) = fields.get_mut(name) else { continue };
        if value.is_string() {
            continue;
        }
        *value = Value::String(value.to_string());
        coerced.push(name.to_string());
    }

    (fields, coerced)
}

/// Two-stage decode of a stored hash. Never fails.
pub fn decode_record(key: &str, fields: Fields) -> StoryRecord {
    let first_err = match Story::from_fields(&fields) {
        Ok(story) => return StoryRecord::Valid(story),
        Err(e) => e,
    };

    let (repaired, coerced) = repair(fields);
    warn!(%key, error = %first_err, coerced = ?coerced, "story record failed validation; applied field coercions");

    match Story::from_fields(&repaired) {
        Ok(story) => StoryRecord::Valid(story),
        Err(e) => {
            warn!(%key, error = %e, "story record still invalid after repair; returning unvalidated record");
            StoryRecord::Degraded(repaired)
        }
    }
}
