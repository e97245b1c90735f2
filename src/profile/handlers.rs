use axum::{extract::DefaultBodyLimit, extract::State, routing::get, Json, Router};
use tracing::instrument;

use crate::{
    auth::extractors::AuthUser,
    error::ApiError,
    state::AppState,
    users::{
        dto::{UserEnvelope, UserForm},
        handlers::BODY_LIMIT,
        repo_types::PublicUser,
        services,
    },
};

/// Self-service read/update; the target is always the caller.
pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

#[instrument(skip_all, fields(user_id = %caller.id))]
pub async fn get_profile(AuthUser(caller): AuthUser) -> Json<PublicUser> {
    // The gate has just loaded the record.
    Json(caller)
}

#[instrument(skip_all, fields(user_id = %caller.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    form: UserForm,
) -> Result<Json<UserEnvelope>, ApiError> {
    let user = services::update_user(state.store.as_ref(), caller.id, form.into_update()?).await?;
    Ok(Json(UserEnvelope {
        message: "Profile updated",
        user,
    }))
}
