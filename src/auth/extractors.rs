use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo_types::PublicUser;

/// Authenticated caller, loaded fresh from the store on every request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub PublicUser);

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiError::Unauthenticated("Missing Authorization header"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or(ApiError::Unauthenticated("Invalid Authorization header"))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(ApiError::Unauthenticated("Invalid Authorization header"));
    }
    Ok(token.trim())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let claims = state.keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            ApiError::Unauthenticated("Invalid or expired token")
        })?;

        // Tokens outlive deletions; the user must still exist.
        let user = state
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token for missing user");
                ApiError::Unauthenticated("Invalid or expired token")
            })?;

        Ok(AuthUser(user.into()))
    }
}
