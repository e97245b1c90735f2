use anyhow::Context;
use tracing::info;

use crate::auth::password::hash_password_blocking;
use crate::config::AdminConfig;
use crate::error::StoreError;
use crate::users::repo::UserStore;
use crate::users::repo_types::NewUser;

/// Creates the admin account unless a user with its username exists.
/// Returns `true` when the account was created.
pub async fn ensure_admin(store: &dyn UserStore, admin: &AdminConfig) -> anyhow::Result<bool> {
    if store
        .find_by_username(&admin.username)
        .await
        .context("look up admin user")?
        .is_some()
    {
        info!(username = %admin.username, "admin already exists");
        return Ok(false);
    }

    let password_hash = hash_password_blocking(admin.password.clone()).await?;
    let created = store
        .insert(NewUser {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password_hash,
            image: None,
        })
        .await;

    match created {
        Ok(user) => {
            info!(user_id = %user.id, username = %user.username, "default admin created");
            Ok(true)
        }
        // Another instance may have created it between our lookup and insert.
        Err(StoreError::Conflict) => {
            if store.find_by_username(&admin.username).await?.is_some() {
                info!(username = %admin.username, "admin already exists");
                return Ok(false);
            }
            anyhow::bail!("admin email {} belongs to another user", admin.email)
        }
        Err(e) => Err(e).context("create admin user"),
    }
}
