use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};

use super::codec::{decode_record, draft_to_fields};
use super::model::{StoryDraft, StoryRecord};
use crate::errors::ServiceError;
use crate::kv::HashStore;

pub const KEY_PREFIX: &str = "story:";
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// CRUD over story hashes stored under `story:<id>`.
///
/// No locking, retries or multi-key atomicity: each call is one or a few
/// independent requests to the backend and backend errors are returned as-is.
#[derive(Clone)]
pub struct StoryStore {
    kv: Arc<dyn HashStore>,
}

impl StoryStore {
    pub fn new(kv: Arc<dyn HashStore>) -> Self {
        Self { kv }
    }

    pub fn key(id: &str) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    /// Write a new story. `draft.id` is required and checked before any
    /// write. Returns the record as written, without reading it back; it is
    /// classified by the same strict check a later `get` applies first.
    pub async fn create(&self, draft: StoryDraft) -> Result<StoryRecord, ServiceError> {
        let id = match draft.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => return Err(ServiceError::MissingIdentifier),
        };
        let key = Self::key(id);
        let fields = draft_to_fields(&draft);
        self.kv.hset(&key, &fields).await?;
        info!(story_id = %id, "story created");
        Ok(StoryRecord::from_fields(fields))
    }

    /// Read a story; `None` when the key is absent. Malformed hashes are
    /// repaired and returned, never rejected.
    pub async fn get(&self, id: &str) -> Result<Option<StoryRecord>, ServiceError> {
        let key = Self::key(id);
        match self.kv.hgetall(&key).await? {
            Some(fields) if !fields.is_empty() => Ok(Some(decode_record(&key, fields))),
            _ => Ok(None),
        }
    }

    /// Merge the provided fields into an existing story and return the
    /// re-read record. `None`, with nothing written, when the story does not
    /// exist. The id is immutable; a draft id is ignored.
    pub async fn update(&self, id: &str, draft: StoryDraft) -> Result<Option<StoryRecord>, ServiceError> {
        let key = Self::key(id);
        if !self.kv.exists(&key).await? {
            debug!(story_id = %id, "update skipped; story not found");
            return Ok(None);
        }
        let mut fields = draft_to_fields(&draft);
        fields.remove("id");
        if !fields.is_empty() {
            self.kv.hset(&key, &fields).await?;
            info!(story_id = %id, fields = fields.len(), "story updated");
        }
        self.get(id).await
    }

    /// True only when exactly one key was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        let removed = self.kv.del(&Self::key(id)).await?;
        info!(story_id = %id, removed, "story delete");
        Ok(removed == 1)
    }

    /// Up to `limit` stories, in whatever order the backend enumerates keys.
    /// Scans the whole `story:*` key space; hashes are fetched concurrently.
    pub async fn list(&self, limit: usize) -> Result<Vec<StoryRecord>, ServiceError> {
        let pattern = format!("{KEY_PREFIX}*");
        let mut keys = self.kv.keys(&pattern).await?;
        keys.truncate(limit);

        let hashes = try_join_all(keys.iter().map(|key| self.kv.hgetall(key))).await?;
        let records: Vec<StoryRecord> = keys
            .iter()
            .zip(hashes)
            .filter_map(|(key, fields)| match fields {
                Some(fields) if !fields.is_empty() => Some(decode_record(key, fields)),
                _ => None,
            })
            .collect();
        debug!(count = records.len(), limit, "listed stories");
        Ok(records)
    }
}
