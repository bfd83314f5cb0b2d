use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kv::Fields;

/// Generation pipeline progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Generating,
    GeneratingStory,
    GeneratingImages,
    Complete,
    Failed,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::GeneratingStory => "generating_story",
            Self::GeneratingImages => "generating_images",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPage {
    pub text: String,
    pub image_prompt: String,
}

/// Generated story text, one entry per illustrated page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryContent {
    pub title: String,
    pub pages: Vec<StoryPage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moral: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryImage {
    pub page: usize,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Validated story record, exactly as it sits in the hash.
/// `story_content` and `images` hold JSON text, see [`Story::parse_story_content`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub age: String,
    pub status: StoryStatus,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub deletion_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub(crate) fn is_json_text(text: &str) -> bool {
    serde_json::from_str::<Value>(text).is_ok()
}

impl Story {
    /// Strict decode: serde shape plus nested fields holding JSON text.
    pub fn from_fields(fields: &Fields) -> Result<Self, String> {
        let story: Story =
            serde_json::from_value(Value::Object(fields.clone())).map_err(|e| e.to_string())?;
        for (name, text) in [("storyContent", &story.story_content), ("images", &story.images)] {
            if let Some(text) = text {
                if !is_json_text(text) {
                    return Err(format!("{name} is not valid JSON text"));
                }
            }
        }
        Ok(story)
    }

    pub fn parse_story_content(&self) -> Option<StoryContent> {
        self.story_content.as_deref().and_then(|s| serde_json::from_str(s).ok())
    }

    pub fn parse_images(&self) -> Option<Vec<StoryImage>> {
        self.images.as_deref().and_then(|s| serde_json::from_str(s).ok())
    }
}

/// A nested field on input: either JSON text already, or the structured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Nested<T> {
    Encoded(String),
    Value(T),
}

/// Partial story used for both create and update. Only `Some` fields are
/// written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StoryStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_content: Option<Nested<StoryContent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Nested<Vec<StoryImage>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoryDraft {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()), ..Self::default() }
    }
}

/// What a read hands back. Records that still fail validation after repair
/// are returned as the raw (repaired) hash instead of an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StoryRecord {
    Valid(Story),
    Degraded(Fields),
}

impl StoryRecord {
    /// Strict decode, no repair.
    pub fn from_fields(fields: Fields) -> Self {
        match Story::from_fields(&fields) {
            Ok(story) => Self::Valid(story),
            Err(_) => Self::Degraded(fields),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn as_story(&self) -> Option<&Story> {
        match self {
            Self::Valid(story) => Some(story),
            Self::Degraded(_) => None,
        }
    }

    pub fn into_story(self) -> Option<Story> {
        match self {
            Self::Valid(story) => Some(story),
            Self::Degraded(_) => None,
        }
    }

    fn text(&self, name: &str) -> Option<&str> {
        match self {
            Self::Valid(_) => None,
            Self::Degraded(fields) => fields.get(name).and_then(Value::as_str),
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Valid(story) => Some(&story.id),
            Self::Degraded(_) => self.text("id"),
        }
    }

    pub fn story_content(&self) -> Option<&str> {
        match self {
            Self::Valid(story) => story.story_content.as_deref(),
            Self::Degraded(_) => self.text("storyContent"),
        }
    }

    pub fn images(&self) -> Option<&str> {
        match self {
            Self::Valid(story) => story.images.as_deref(),
            Self::Degraded(_) => self.text("images"),
        }
    }

    pub fn deletion_token(&self) -> Option<&str> {
        match self {
            Self::Valid(story) => Some(&story.deletion_token),
            Self::Degraded(_) => self.text("deletionToken"),
        }
    }

    /// Unknown or missing visibility reads as public.
    pub fn visibility(&self) -> Visibility {
        match self {
            Self::Valid(story) => story.visibility,
            Self::Degraded(_) => self
                .text("visibility")
                .and_then(|v| serde_json::from_value(Value::from(v)).ok())
                .unwrap_or_default(),
        }
    }

    /// JSON form with the deletion token removed, for public responses.
    pub fn to_public_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("deletionToken");
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        match v {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn status_wire_spelling() {
        for status in [
            StoryStatus::Generating,
            StoryStatus::GeneratingStory,
            StoryStatus::GeneratingImages,
            StoryStatus::Complete,
            StoryStatus::Failed,
        ] {
            assert_eq!(serde_json::to_value(status).unwrap(), json!(status.as_str()));
        }
        assert!(StoryStatus::Failed.is_finished());
        assert!(!StoryStatus::GeneratingImages.is_finished());
    }

    #[test]
    fn story_defaults_visibility_and_text_fields() {
        let story: Story = serde_json::from_value(json!({
            "id": "s1",
            "status": "generating",
            "createdAt": "2024-01-01T00:00:00Z",
            "deletionToken": "tok"
        }))
        .unwrap();
        assert_eq!(story.visibility, Visibility::Public);
        assert_eq!(story.title, "");
        assert!(story.story_content.is_none());
    }

    #[test]
    fn draft_accepts_encoded_or_structured_content() {
        let draft: StoryDraft = serde_json::from_value(json!({
            "storyContent": {"title": "T", "pages": [{"text": "x", "imagePrompt": "y"}]},
            "images": "[]"
        }))
        .unwrap();
        assert!(matches!(draft.story_content, Some(Nested::Value(_))));
        assert_eq!(draft.images, Some(Nested::Encoded("[]".into())));
    }

    #[test]
    fn record_accessors_on_degraded_hash() {
        let record = StoryRecord::from_fields(fields(json!({
            "id": "s1",
            "visibility": "unlisted",
            "storyContent": "{}",
            "deletionToken": "tok"
        })));
        assert!(!record.is_valid());
        assert_eq!(record.id(), Some("s1"));
        assert_eq!(record.visibility(), Visibility::Unlisted);
        assert_eq!(record.story_content(), Some("{}"));
        let public = record.to_public_json();
        assert!(public.get("deletionToken").is_none());
        assert_eq!(public["id"], "s1");
    }

    #[test]
    fn public_json_of_valid_story_is_flat() {
        let record = StoryRecord::from_fields(fields(json!({
            "id": "s1",
            "status": "complete",
            "createdAt": "2024-01-01T00:00:00Z",
            "deletionToken": "tok"
        })));
        assert!(record.is_valid());
        let public = record.to_public_json();
        assert_eq!(public["status"], "complete");
        assert_eq!(public["visibility"], "public");
        assert!(public.get("deletionToken").is_none());
    }

    #[test]
    fn non_json_nested_text_fails_strict_decode() {
        let record = StoryRecord::from_fields(fields(json!({
            "id": "s1",
            "status": "complete",
            "createdAt": "2024-01-01T00:00:00Z",
            "deletionToken": "tok",
            "storyContent": "not json"
        })));
        assert!(!record.is_valid());
        assert_eq!(record.story_content(), Some("not json"));
    }
}
