use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    errors::{AppError, ConflictReason},
    users::{
        dto::{CreateUserRequest, UpdateUserRequest},
        password::CredentialHasher,
        repo::{StoreError, UserStore},
        repo_types::{AccountStatus, NewUser, User},
        validation::{validate_create, validate_update},
    },
};

/// The eight account operations. Cheap to clone; shares the store and
/// hasher with every request.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn UserStore>,
    hasher: CredentialHasher,
}

impl AccountService {
    pub fn new(store: Arc<dyn UserStore>, hasher: CredentialHasher) -> Self {
        Self { store, hasher }
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    pub async fn create(&self, req: CreateUserRequest) -> Result<User, AppError> {
        let valid = validate_create(req)?;

        // Friendly messages for the common case. The unique indexes still
        // arbitrate races at insert time.
        if self.store.find_by_username(&valid.username).await?.is_some() {
            warn!(username = %valid.username, "username already exists");
            return Err(AppError::Conflict(ConflictReason::UsernameTaken));
        }
        if self.store.find_by_email(&valid.email).await?.is_some() {
            warn!(email = %valid.email, "email already registered");
            return Err(AppError::Conflict(ConflictReason::EmailTaken));
        }

        let password_hash = self.hasher.hash_blocking(valid.password).await?;

        let candidate = NewUser {
            username: valid.username,
            email: valid.email,
            password_hash,
            full_name: valid.full_name,
            status: valid.status,
            is_superuser: valid.is_superuser,
        };
        let user = match self.store.insert(candidate).await {
            Ok(u) => u,
            Err(StoreError::UniqueViolation(field)) => {
                warn!(?field, "unique constraint rejected insert");
                return Err(AppError::Conflict(field.into()));
            }
            Err(e) => return Err(e.into()),
        };

        info!(user_id = user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>, AppError> {
        Ok(self.store.list_all().await?)
    }

    pub async fn get(&self, id: i64) -> Result<User, AppError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(AppError::user_not_found)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<User, AppError> {
        self.store
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {username} not found")))
    }

    pub async fn update(&self, id: i64, req: UpdateUserRequest) -> Result<User, AppError> {
        let patch = validate_update(req)?;
        let user = self.store.update(id, patch).await.map_err(|e| {
            if let StoreError::UniqueViolation(field) = &e {
                warn!(user_id = id, ?field, "unique constraint rejected update");
            }
            AppError::from(e)
        })?;
        info!(user_id = id, "user updated");
        Ok(user)
    }

    /// Soft delete: the row and its username/email reservations stay.
    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        self.set_status(id, AccountStatus::Deactivated).await?;
        Ok(())
    }

    pub async fn activate(&self, id: i64) -> Result<User, AppError> {
        self.set_status(id, AccountStatus::Active).await
    }

    pub async fn deactivate(&self, id: i64) -> Result<User, AppError> {
        self.set_status(id, AccountStatus::Deactivated).await
    }

    async fn set_status(&self, id: i64, status: AccountStatus) -> Result<User, AppError> {
        let user = self.store.set_status(id, status).await?;
        info!(user_id = id, %status, "user status changed");
        Ok(user)
    }
}
