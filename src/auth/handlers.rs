use std::sync::OnceLock;

use axum::{extract::State, routing::post, Json, Router};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest},
        password::{hash_password, verify_password, verify_password_blocking},
    },
    body::JsonOrForm,
    error::ApiError,
    state::AppState,
};

const BAD_CREDENTIALS: &str = "Invalid username or password";

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

/// Hash checked against when the username is unknown, so both failure paths cost the same.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("userdir-timing-equalizer").ok())
        .as_deref()
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonOrForm(payload): JsonOrForm<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let (Some(username), Some(password)) = (payload.username, payload.password) else {
        return Err(ApiError::validation("Missing credentials"));
    };
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::validation("Missing credentials"));
    }

    let Some(user) = state.store.find_by_username(&username).await? else {
        let equalize = tokio::task::spawn_blocking(move || {
            if let Some(hash) = dummy_hash() {
                verify_password(&password, hash);
            }
        });
        if let Err(e) = equalize.await {
            warn!(error = %e, "dummy password verification task failed");
        }
        warn!(%username, "login failed");
        return Err(ApiError::Unauthenticated(BAD_CREDENTIALS));
    };

    if !verify_password_blocking(password, user.password_hash.clone()).await? {
        warn!(%username, "login failed");
        return Err(ApiError::Unauthenticated(BAD_CREDENTIALS));
    }

    let token = state.keys.sign(user.id)?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}
