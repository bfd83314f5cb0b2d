//! Story persistence: record model, wire codec and the CRUD store.

pub mod codec;
pub mod model;
pub mod store;

pub use model::{
    Nested, Story, StoryContent, StoryDraft, StoryImage, StoryPage, StoryRecord, StoryStatus,
    Visibility,
};
pub use store::{StoryStore, DEFAULT_LIST_LIMIT, KEY_PREFIX};
