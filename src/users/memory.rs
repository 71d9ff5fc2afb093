//! In-process `UserStore` for tests. A single lock makes every write atomic
//! and enforces the same unique columns as the Postgres schema.

use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::users::{
    repo::{StoreError, UserStore},
    repo_types::{AccountStatus, NewUser, UniqueField, User, UserPatch},
};

#[derive(Default)]
struct Inner {
    rows: BTreeMap<i64, User>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn collides(rows: &BTreeMap<i64, User>, skip: Option<i64>, field: UniqueField, value: &str) -> bool {
    rows.values().filter(|u| Some(u.id) != skip).any(|u| match field {
        UniqueField::Username => u.username == value,
        UniqueField::Email => u.email == value,
    })
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.rows.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.rows.values().find(|u| u.email == email).cloned())
    }

    async fn insert(&self, candidate: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if collides(&inner.rows, None, UniqueField::Username, &candidate.username) {
            return Err(StoreError::UniqueViolation(Some(UniqueField::Username)));
        }
        if collides(&inner.rows, None, UniqueField::Email, &candidate.email) {
            return Err(StoreError::UniqueViolation(Some(UniqueField::Email)));
        }
        inner.next_id += 1;
        let user = User {
            id: inner.next_id,
            username: candidate.username,
            email: candidate.email,
            password_hash: candidate.password_hash,
            full_name: candidate.full_name,
            status: candidate.status,
            is_superuser: candidate.is_superuser,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        };
        inner.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(email) = patch.email.as_deref() {
            if !inner.rows.contains_key(&id) {
                return Err(StoreError::NotFound);
            }
            if collides(&inner.rows, Some(id), UniqueField::Email, email) {
                return Err(StoreError::UniqueViolation(Some(UniqueField::Email)));
            }
        }
        let user = inner.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(full_name) = patch.full_name {
            user.full_name = full_name;
        }
        if let Some(status) = patch.status {
            user.status = status;
        }
        if let Some(is_superuser) = patch.is_superuser {
            user.is_superuser = is_superuser;
        }
        user.updated_at = Some(OffsetDateTime::now_utc());
        Ok(user.clone())
    }

    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.read().await.rows.values().cloned().collect())
    }

    async fn set_status(&self, id: i64, status: AccountStatus) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        let user = inner.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.status = status;
        user.updated_at = Some(OffsetDateTime::now_utc());
        Ok(user.clone())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Store whose every call fails as if Postgres were unreachable.
pub struct UnreachableStore;

#[async_trait]
impl UserStore for UnreachableStore {
    async fn find_by_id(&self, _id: i64) -> Result<Option<User>, StoreError> {
        Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
    }
    async fn find_by_username(&self, _u: &str) -> Result<Option<User>, StoreError> {
        Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
    }
    async fn find_by_email(&self, _e: &str) -> Result<Option<User>, StoreError> {
        Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
    }
    async fn insert(&self, _c: NewUser) -> Result<User, StoreError> {
        Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
    }
    async fn update(&self, _id: i64, _p: UserPatch) -> Result<User, StoreError> {
        Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
    }
    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
    }
    async fn set_status(&self, _id: i64, _s: AccountStatus) -> Result<User, StoreError> {
        Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
    }
    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
    }
}
