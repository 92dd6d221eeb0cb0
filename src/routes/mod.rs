pub mod auth;
pub mod count;
pub mod envelope;
pub mod extract;
pub mod health;
pub mod metadata;
pub mod users;

use axum::{
    routing::{delete, get, put},
    Router,
};

pub use auth::{AdminUser, AuthUser};
pub use health::{health_check, run_health_check, HealthReport};

use crate::error::AppError;
use crate::AppState;

/// Unmatched paths still answer with the envelope
async fn not_found() -> AppError {
    AppError::NotFound("Resource not found.".to_string())
}

/// Build the `/api/v1` router
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/version", get(health::version))
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/:username", delete(users::delete_user))
        .route("/users/:username/password", put(users::change_password))
        .route("/metadata", get(metadata::list_metadata))
        .route(
            "/metadata/:app",
            get(metadata::get_metadata)
                .post(metadata::add_metadata)
                .delete(metadata::delete_metadata),
        )
        .route(
            "/metadata/:app/fields",
            delete(metadata::delete_metadata_fields),
        )
        .route(
            "/count",
            get(count::current_count).post(count::next_count),
        )
        .route(
            "/count/:count_id/note",
            get(count::get_note).put(count::set_note),
        );

    Router::new()
        .nest("/api/v1", api)
        .fallback(not_found)
        .with_state(state)
}
