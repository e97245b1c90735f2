use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::users::repo::UserStore;
use crate::users::repo_types::{NewUser, User, UserChanges};

/// In-process store with the same uniqueness rules as the Postgres schema.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

fn taken(users: &[User], skip: Option<Uuid>, username: Option<&str>, email: Option<&str>) -> bool {
    users.iter().filter(|u| Some(u.id) != skip).any(|u| {
        username.is_some_and(|n| u.username == n) || email.is_some_and(|e| u.email == e)
    })
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn list(&self, search: Option<&str>) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        let term = search.map(str::to_lowercase);
        let mut found: Vec<User> = users
            .iter()
            .filter(|u| {
                term.as_deref().map_or(true, |t| {
                    u.username.to_lowercase().contains(t) || u.email.to_lowercase().contains(t)
                })
            })
            .cloned()
            .collect();
        // Stable, so equal timestamps keep insertion order.
        found.sort_by_key(|u| u.created_at);
        Ok(found)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.username == username || u.email == email)
            .cloned())
    }

    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if taken(&users, None, Some(&new.username), Some(&new.email)) {
            return Err(StoreError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            image: new.image,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        if !users.iter().any(|u| u.id == id) {
            return Ok(None);
        }
        if taken(
            &users,
            Some(id),
            changes.username.as_deref(),
            changes.email.as_deref(),
        ) {
            return Err(StoreError::Conflict);
        }
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(image) = changes.image {
            user.image = image;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            image: None,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_username_or_email() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "a@x.com")).await.unwrap();

        let dup_name = store.insert(new_user("alice", "other@x.com")).await;
        assert!(matches!(dup_name, Err(StoreError::Conflict)));
        let dup_email = store.insert(new_user("other", "a@x.com")).await;
        assert!(matches!(dup_email, Err(StoreError::Conflict)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn uniqueness_is_case_sensitive() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "a@x.com")).await.unwrap();
        store.insert(new_user("Alice", "A@x.com")).await.unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn update_to_taken_email_conflicts() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "a@x.com")).await.unwrap();
        let bob = store.insert(new_user("bob", "b@x.com")).await.unwrap();

        let changes = UserChanges {
            email: Some("a@x.com".into()),
            ..Default::default()
        };
        assert!(matches!(
            store.update(bob.id, changes).await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn update_of_missing_user_is_none_even_when_username_taken() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "a@x.com")).await.unwrap();
        let changes = UserChanges {
            username: Some("alice".into()),
            ..Default::default()
        };
        let result = store.update(Uuid::new_v4(), changes).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn update_keeping_own_username_is_allowed() {
        let store = MemoryUserStore::new();
        let alice = store.insert(new_user("alice", "a@x.com")).await.unwrap();
        let changes = UserChanges {
            username: Some("alice".into()),
            ..Default::default()
        };
        let updated = store.update(alice.id, changes).await.unwrap().unwrap();
        assert_eq!(updated.username, "alice");
    }

    #[tokio::test]
    async fn list_preserves_insertion_order() {
        let store = MemoryUserStore::new();
        for name in ["c", "a", "b"] {
            store
                .insert(new_user(name, &format!("{name}@x.com")))
                .await
                .unwrap();
        }
        let names: Vec<_> = store
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, ["c", "a", "b"]);
    }
}
