use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use service::stories::{StoryDraft, StoryRecord, StoryStatus, Visibility};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{errors::JsonApiError, state::AppState};

/// Header carrying the owner's deletion token.
pub const DELETION_TOKEN_HEADER: &str = "x-deletion-token";

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn presented_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(DELETION_TOKEN_HEADER).and_then(|v| v.to_str().ok())
}

/// Load the story and check the caller holds its token.
async fn authorize(state: &AppState, id: &str, headers: &HeaderMap) -> Result<StoryRecord, JsonApiError> {
    let record = state.stories.get(id).await?.ok_or_else(|| JsonApiError::not_found("story"))?;
    match (presented_token(headers), record.deletion_token()) {
        (Some(given), Some(stored)) if given == stored => Ok(record),
        _ => {
            warn!(story_id = %id, "rejected request with missing or wrong deletion token");
            Err(JsonApiError::forbidden())
        }
    }
}

/// Public stories only; unlisted ones are reachable by id alone.
///
/// `limit` caps how many stored records are scanned, and the visibility
/// filter runs afterwards, so a page can hold fewer than `limit` items even
/// when more public stories exist.
pub async fn list(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Value>>, JsonApiError> {
    let limit = q.limit.unwrap_or(state.list_limit);
    let records = state.stories.list(limit).await?;
    let items: Vec<Value> = records
        .iter()
        .filter(|r| r.visibility() == Visibility::Public)
        .map(StoryRecord::to_public_json)
        .collect();
    info!(count = items.len(), limit, "list stories");
    Ok(Json(items))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, JsonApiError> {
    match state.stories.get(&id).await? {
        Some(record) => Ok(Json(record.to_public_json())),
        None => Err(JsonApiError::not_found("story")),
    }
}

/// Create a story. The server owns `id`, `createdAt` and `deletionToken`;
/// the response is the only place the token is ever returned.
pub async fn create(
    State(state): State<AppState>,
    Json(mut draft): Json<StoryDraft>,
) -> Result<(StatusCode, Json<StoryRecord>), JsonApiError> {
    draft.id = Some(Uuid::new_v4().to_string());
    draft.created_at = Some(now());
    draft.deletion_token = Some(Uuid::new_v4().simple().to_string());
    draft.status.get_or_insert(StoryStatus::Generating);
    draft.visibility.get_or_insert(Visibility::Public);

    let record = state.stories.create(draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Partial update by the story owner. Reaching a finished status stamps
/// `completedAt` unless the caller supplied one.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(mut patch): Json<StoryDraft>,
) -> Result<Json<Value>, JsonApiError> {
    authorize(&state, &id, &headers).await?;

    patch.id = None;
    patch.created_at = None;
    patch.deletion_token = None;
    if patch.status.is_some_and(|s| s.is_finished()) && patch.completed_at.is_none() {
        patch.completed_at = Some(now());
    }

    match state.stories.update(&id, patch).await? {
        Some(record) => Ok(Json(record.to_public_json())),
        None => Err(JsonApiError::not_found("story")),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, JsonApiError> {
    authorize(&state, &id, &headers).await?;
    if state.stories.delete(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(JsonApiError::not_found("story"))
    }
}
