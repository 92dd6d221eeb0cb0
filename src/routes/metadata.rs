use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::db::HashFields;
use crate::error::Result;
use crate::routes::auth::{AdminUser, AuthUser};
use crate::routes::envelope::{ok, ok_message, Envelope};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::store::fields_from_json;
use crate::AppState;

/// Optional environment scope
#[derive(Debug, Default, Deserialize)]
pub struct EnvQuery {
    #[serde(default)]
    pub env: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteFieldsRequest {
    pub keys: Vec<String>,
}

/// Every metadata record name
pub async fn list_metadata(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Envelope<HashFields>>> {
    Ok(ok(state.metadata().get_metadata_keys_index().await?))
}

pub async fn get_metadata(
    State(state): State<AppState>,
    _user: AuthUser,
    ApiPath(app): ApiPath<String>,
    ApiQuery(query): ApiQuery<EnvQuery>,
) -> Result<Json<Envelope<HashFields>>> {
    Ok(ok(state.metadata().get_metadata(&app, &query.env).await?))
}

/// Merge the posted fields into a record (admin only)
///
/// Returns 409 Conflict if the record changed mid-update; the caller may retry.
pub async fn add_metadata(
    State(state): State<AppState>,
    admin: AdminUser,
    ApiPath(app): ApiPath<String>,
    ApiQuery(query): ApiQuery<EnvQuery>,
    ApiJson(body): ApiJson<Value>,
) -> Result<Json<Envelope<Value>>> {
    let fields = fields_from_json(body)?;

    state
        .metadata()
        .add_metadata(&app, &fields, &query.env)
        .await?;

    tracing::info!(
        "Metadata for {} (env {:?}) updated by {}",
        app,
        query.env,
        admin.username
    );

    Ok(ok_message("Metadata updated."))
}

/// Remove selected fields from a record (admin only)
pub async fn delete_metadata_fields(
    State(state): State<AppState>,
    _admin: AdminUser,
    ApiPath(app): ApiPath<String>,
    ApiQuery(query): ApiQuery<EnvQuery>,
    ApiJson(payload): ApiJson<DeleteFieldsRequest>,
) -> Result<Json<Envelope<Value>>> {
    state
        .metadata()
        .delete_metadata(&app, &payload.keys, &query.env)
        .await?;

    Ok(ok_message("Metadata fields deleted."))
}

/// Remove a whole record (admin only)
pub async fn delete_metadata(
    State(state): State<AppState>,
    admin: AdminUser,
    ApiPath(app): ApiPath<String>,
    ApiQuery(query): ApiQuery<EnvQuery>,
) -> Result<Json<Envelope<Value>>> {
    state
        .metadata()
        .delete_metadata_hashkey(&app, &query.env)
        .await?;

    tracing::info!(
        "Metadata for {} (env {:?}) deleted by {}",
        app,
        query.env,
        admin.username
    );

    Ok(ok_message("Metadata deleted."))
}
