use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password::hash_password_blocking;
use crate::error::{ApiError, StoreError};
use crate::users::dto::{CreateUser, ImageChange, UpdateUser};
use crate::users::repo::UserStore;
use crate::users::repo_types::{NewUser, PublicUser, UserChanges};

/// Ids that don't parse can't exist.
pub fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}

pub async fn list_users(
    store: &dyn UserStore,
    search: Option<&str>,
) -> Result<Vec<PublicUser>, ApiError> {
    let term = search.filter(|s| !s.is_empty());
    let users = store.list(term).await?;
    Ok(users.into_iter().map(PublicUser::from).collect())
}

pub async fn create_user(store: &dyn UserStore, input: CreateUser) -> Result<PublicUser, ApiError> {
    if store
        .find_by_username_or_email(&input.username, &input.email)
        .await?
        .is_some()
    {
        warn!(username = %input.username, "username or email already exists");
        return Err(ApiError::Conflict);
    }

    let password_hash = hash_password_blocking(input.password).await?;
    // A concurrent create can pass the check above; the store's constraint decides.
    let user = store
        .insert(NewUser {
            username: input.username,
            email: input.email,
            password_hash,
            image: input.image,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, "user created");
    Ok(user.into())
}

pub async fn get_user(store: &dyn UserStore, id: Uuid) -> Result<PublicUser, ApiError> {
    store
        .find_by_id(id)
        .await?
        .map(PublicUser::from)
        .ok_or(ApiError::NotFound)
}

pub async fn update_user(
    store: &dyn UserStore,
    id: Uuid,
    input: UpdateUser,
) -> Result<PublicUser, ApiError> {
    let password_hash = match input.password {
        Some(plain) => Some(hash_password_blocking(plain).await?),
        None => None,
    };
    let changes = UserChanges {
        username: input.username,
        email: input.email,
        password_hash,
        image: match input.image {
            ImageChange::Keep => None,
            ImageChange::Clear => Some(None),
            ImageChange::Set(image) => Some(Some(image)),
        },
    };

    let user = match store.update(id, changes).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(ApiError::NotFound),
        Err(StoreError::Conflict) => {
            warn!(user_id = %id, "update collides with existing username or email");
            return Err(ApiError::Conflict);
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, updated_at = %user.updated_at, "user updated");
    Ok(user.into())
}

pub async fn delete_user(store: &dyn UserStore, id: Uuid) -> Result<(), ApiError> {
    if !store.delete(id).await? {
        return Err(ApiError::NotFound);
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}
