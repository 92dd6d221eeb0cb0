use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::routes::auth::AuthUser;
use crate::routes::envelope::{ok, ok_message, Envelope};
use crate::routes::extract::{ApiJson, ApiPath};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub count_id: i64,
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub struct SetNoteRequest {
    pub note: String,
}

pub async fn current_count(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Envelope<CountResponse>>> {
    let count = state.count().get_current_count().await?;
    Ok(ok(CountResponse { count }))
}

/// Claim the next count
pub async fn next_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Envelope<CountResponse>>> {
    let count = state.count().get_next_count().await?;
    tracing::info!("Count {} issued to {}", count, user.username);
    Ok(ok(CountResponse { count }))
}

pub async fn get_note(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiPath(count_id): ApiPath<i64>,
) -> Result<Json<Envelope<NoteResponse>>> {
    let note = state.count().get_notes(count_id).await?;
    Ok(ok(NoteResponse { count_id, note }))
}

pub async fn set_note(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiPath(count_id): ApiPath<i64>,
    ApiJson(payload): ApiJson<SetNoteRequest>,
) -> Result<Json<Envelope<Value>>> {
    state.count().set_notes(count_id, &payload.note).await?;
    Ok(ok_message(format!("Note set for count id {}.", count_id)))
}
