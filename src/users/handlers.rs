use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::AuthUser,
    error::{ApiError, MessageBody},
    state::AppState,
    users::{
        dto::{SearchQuery, UserEnvelope, UserForm},
        repo_types::PublicUser,
        services,
    },
};

pub const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10MB

pub fn directory_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
}

#[instrument(skip(state, _caller))]
pub async fn list_users(
    State(state): State<AppState>,
    _caller: AuthUser,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let users = services::list_users(state.store.as_ref(), q.search.as_deref()).await?;
    Ok(Json(users))
}

#[instrument(skip(state, _caller, form))]
pub async fn create_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    form: UserForm,
) -> Result<(StatusCode, Json<UserEnvelope>), ApiError> {
    let user = services::create_user(state.store.as_ref(), form.into_create()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserEnvelope {
            message: "User created",
            user,
        }),
    ))
}

#[instrument(skip(state, _caller))]
pub async fn get_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<PublicUser>, ApiError> {
    let id = services::parse_id(&id)?;
    Ok(Json(services::get_user(state.store.as_ref(), id).await?))
}

#[instrument(skip(state, _caller, form))]
pub async fn update_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(id): Path<String>,
    form: UserForm,
) -> Result<Json<UserEnvelope>, ApiError> {
    let id = services::parse_id(&id)?;
    let user = services::update_user(state.store.as_ref(), id, form.into_update()?).await?;
    Ok(Json(UserEnvelope {
        message: "User updated",
        user,
    }))
}

#[instrument(skip(state, _caller))]
pub async fn delete_user(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, ApiError> {
    let id = services::parse_id(&id)?;
    services::delete_user(state.store.as_ref(), id).await?;
    Ok(Json(MessageBody {
        message: "User deleted".into(),
    }))
}
