//! Credential store: user existence, password hashes and the admin flag.
//!
//! Layout:
//! - `users` hash: username -> username (the existence index)
//! - `user:{username}`: Argon2 PHC hash
//! - `user:{username}:admin`: `"1"` or `"0"`

use crate::constants::USERS_INDEX_KEY;
use crate::db::{keys, Db, WriteOp};
use crate::error::{AppError, Result};
use crate::security;
use crate::validation::{validate_identifier, validate_secret};

fn not_found(username: &str) -> AppError {
    AppError::NotFound(format!("User {} does not exist.", username))
}

/// Hash off the async runtime; Argon2 takes tens of milliseconds
async fn hash_blocking(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || security::hash_password(&password)).await?
}

#[derive(Clone)]
pub struct UserStore {
    db: Db,
}

impl UserStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// True iff the username is in the users index
    pub async fn exists(&self, username: &str) -> Result<bool> {
        validate_identifier(username)?;
        self.db.hash_field_exists(USERS_INDEX_KEY, username).await
    }

    /// All registered usernames, sorted
    pub async fn list_users(&self) -> Result<Vec<String>> {
        let index = self.db.hash_get_all(USERS_INDEX_KEY).await?;
        Ok(index.into_values().collect())
    }

    pub async fn is_admin(&self, username: &str) -> Result<bool> {
        if !self.exists(username).await? {
            return Err(not_found(username));
        }

        let Some(flag) = self.db.get(&keys::user_admin(username)).await? else {
            return Ok(false);
        };

        flag.trim()
            .parse::<i64>()
            .map(|v| v != 0)
            .map_err(|_| AppError::CorruptRecord(format!("admin flag for {}: {:?}", username, flag)))
    }

    /// Fails with `PermissionDenied` unless the user is an admin
    pub async fn admin_gate(&self, username: &str) -> Result<()> {
        if !self.is_admin(username).await? {
            tracing::warn!("Admin gate refused user {}", username);
            return Err(AppError::PermissionDenied);
        }
        Ok(())
    }

    /// Create a user.
    ///
    /// Index entry, hash and admin flag are written in one EXEC, watched on
    /// the password key so a racing create of the same name loses with
    /// `ConcurrentModification` instead of overwriting.
    pub async fn create(&self, username: &str, password: &str, admin: bool) -> Result<()> {
        validate_identifier(username)?;
        if self.exists(username).await? {
            return Err(AppError::AlreadyExists(format!(
                "User {} already exists.",
                username
            )));
        }
        validate_secret(password)?;

        let hash = hash_blocking(password).await?;
        let password_key = keys::user_password(username);

        let mut txn = self.db.transaction().await?;
        txn.watch(&password_key).await?;

        // Re-check on the watched connection; the hash above took a while
        if txn.hash_field_exists(USERS_INDEX_KEY, username).await? {
            txn.unwatch().await?;
            return Err(AppError::AlreadyExists(format!(
                "User {} already exists.",
                username
            )));
        }

        txn.queue(WriteOp::hash_set(USERS_INDEX_KEY, username, username));
        txn.queue(WriteOp::set(password_key, hash));
        txn.queue(WriteOp::set(
            keys::user_admin(username),
            if admin { "1" } else { "0" },
        ));
        txn.commit().await?;

        tracing::info!("User {} created (admin: {})", username, admin);
        Ok(())
    }

    /// Remove the index entry, hash and admin flag in one batch
    pub async fn delete(&self, username: &str) -> Result<()> {
        if !self.exists(username).await? {
            return Err(not_found(username));
        }

        self.db
            .execute_batch(vec![
                WriteOp::hash_delete(USERS_INDEX_KEY, vec![username.to_string()]),
                WriteOp::delete(keys::user_password(username)),
                WriteOp::delete(keys::user_admin(username)),
            ])
            .await
            .map_err(|e| {
                tracing::error!("Deleting user {} did not complete cleanly: {}", username, e);
                e
            })?;

        tracing::info!("User {} deleted", username);
        Ok(())
    }

    /// Replace the stored hash.
    ///
    /// The write only lands if the user is still indexed when EXEC runs, so a
    /// concurrent delete cannot leave an orphaned hash key.
    pub async fn change_password(&self, username: &str, new_password: &str) -> Result<()> {
        if !self.exists(username).await? {
            return Err(not_found(username));
        }
        validate_secret(new_password)?;

        let hash = hash_blocking(new_password).await?;
        let password_key = keys::user_password(username);

        let mut txn = self.db.transaction().await?;
        txn.watch(&password_key).await?;

        if !txn.hash_field_exists(USERS_INDEX_KEY, username).await? {
            txn.unwatch().await?;
            return Err(not_found(username));
        }

        txn.queue(WriteOp::set(password_key, hash));
        txn.commit().await?;

        tracing::info!("Password changed for user {}", username);
        Ok(())
    }

    /// Check a username/password pair.
    ///
    /// `Ok(false)` on mismatch; errors only on malformed input, an unknown
    /// user, or a stored hash that cannot be parsed.
    pub async fn verify_password(&self, username: &str, password: &str) -> Result<bool> {
        validate_identifier(username)?;
        validate_secret(password)?;

        if !self.exists(username).await? {
            return Err(not_found(username));
        }

        let stored = self
            .db
            .get(&keys::user_password(username))
            .await?
            .ok_or_else(|| {
                AppError::CorruptRecord(format!("user {} is indexed but has no hash", username))
            })?;

        let password = password.to_string();
        let matches =
            tokio::task::spawn_blocking(move || security::verify_password(&password, &stored))
                .await??;

        if matches {
            tracing::info!("User {} login success.", username);
        } else {
            tracing::warn!("User {} login failed.", username);
        }

        Ok(matches)
    }
}
