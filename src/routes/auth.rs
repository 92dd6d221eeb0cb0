use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::security::basic_credentials;
use crate::AppState;

/// A caller whose Basic credentials verified against the credential store
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
}

/// An authenticated caller that also passed the admin gate
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub username: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let Some((username, password)) = basic_credentials(&parts.headers) else {
            return Err(AppError::Unauthorized);
        };

        // Unknown users and malformed credentials are plain login failures
        let verified = match state.users().verify_password(&username, &password).await {
            Ok(verified) => verified,
            Err(AppError::NotFound(_)) | Err(AppError::InvalidFormat(_)) => false,
            Err(e) => return Err(e),
        };

        if !verified {
            tracing::warn!("User {} login failed.", username);
            return Err(AppError::Unauthorized);
        }

        Ok(AuthUser { username })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let AuthUser { username } = AuthUser::from_request_parts(parts, state).await?;
        state.users().admin_gate(&username).await?;
        Ok(AdminUser { username })
    }
}
