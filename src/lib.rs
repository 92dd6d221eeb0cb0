//! bsapi library
//!
//! User credentials, application metadata and the deploy counter, stored in
//! Redis and served over a small JSON API.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod routes;
pub mod security;
pub mod store;
pub mod validation;

pub use config::Config;
pub use db::{Backend, Db, MemoryBackend, RedisBackend};
pub use error::{AppError, Result};

use store::{CountStore, MetadataStore, UserStore};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Config,
}

impl AppState {
    /// Create a new AppState with the given backend and configuration
    pub fn new(db: Db, config: Config) -> Self {
        Self { db, config }
    }

    pub fn users(&self) -> UserStore {
        UserStore::new(self.db.clone())
    }

    pub fn metadata(&self) -> MetadataStore {
        MetadataStore::new(self.db.clone())
    }

    pub fn count(&self) -> CountStore {
        CountStore::new(self.db.clone())
    }
}

/// Create the bootstrap admin if it does not exist yet
pub async fn ensure_bootstrap_admin(state: &AppState) -> Result<()> {
    let Some((username, password)) = &state.config.bootstrap_admin else {
        return Ok(());
    };

    let users = state.users();
    if users.exists(username).await? {
        tracing::info!("Bootstrap admin {} already present", username);
        return Ok(());
    }

    match users.create(username, password, true).await {
        // Another instance got there first
        Ok(()) | Err(AppError::AlreadyExists(_)) | Err(AppError::ConcurrentModification) => Ok(()),
        Err(e) => Err(e),
    }
}
