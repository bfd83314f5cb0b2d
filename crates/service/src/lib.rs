//! Service layer for the story app.
//! - `kv`: hash key-value backends (hosted REST service, in-memory).
//! - `stories`: the story store, record model and the read/write codec.

pub mod errors;
pub mod kv;
pub mod stories;

pub use errors::ServiceError;
pub use stories::StoryStore;
