use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::routes::auth::{AdminUser, AuthUser};
use crate::routes::envelope::{ok, ok_message, Envelope};
use crate::routes::extract::{ApiJson, ApiPath};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}

/// List all usernames (admin only)
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Envelope<Vec<String>>>> {
    Ok(ok(state.users().list_users().await?))
}

/// Create a user (admin only)
///
/// Returns 409 Conflict if the username is taken.
pub async fn create_user(
    State(state): State<AppState>,
    admin: AdminUser,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> Result<Json<Envelope<Value>>> {
    state
        .users()
        .create(&payload.username, &payload.password, payload.admin)
        .await?;

    tracing::info!(
        "User {} created by {}",
        payload.username,
        admin.username
    );

    Ok(ok_message(format!("User {} created.", payload.username)))
}

/// Delete a user and all of its keys (admin only)
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    ApiPath(username): ApiPath<String>,
) -> Result<Json<Envelope<Value>>> {
    state.users().delete(&username).await?;

    tracing::info!("User {} deleted by {}", username, admin.username);

    Ok(ok_message(format!("User {} deleted.", username)))
}

/// Change a password
///
/// Users may change their own password; admins may change anyone's.
pub async fn change_password(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiPath(username): ApiPath<String>,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<Json<Envelope<Value>>> {
    let users = state.users();

    if caller.username != username {
        users.admin_gate(&caller.username).await?;
    }

    users.change_password(&username, &payload.password).await?;

    Ok(ok_message(format!("Password changed for user {}.", username)))
}
