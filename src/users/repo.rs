use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use crate::users::repo_types::{AccountStatus, NewUser, UniqueField, User, UserPatch, UserRow};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The unique index rejected the write. `None` when the constraint
    /// could not be attributed to a column.
    #[error("unique constraint violated")]
    UniqueViolation(Option<UniqueField>),
    #[error("user not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("malformed user row: {0}")]
    InvalidRow(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.constraint().and_then(UniqueField::from_constraint))
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e),
            other => StoreError::Database(other),
        }
    }
}

/// Durable user storage. Every write is a single atomic statement; the
/// unique indexes, not prior reads, decide uniqueness.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn insert(&self, candidate: NewUser) -> Result<User, StoreError>;
    async fn update(&self, id: i64, patch: UserPatch) -> Result<User, StoreError>;
    async fn list_all(&self) -> Result<Vec<User>, StoreError>;
    async fn set_status(&self, id: i64, status: AccountStatus) -> Result<User, StoreError>;
    /// Cheapest possible round trip, for health probes.
    async fn ping(&self) -> Result<(), StoreError>;
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, full_name, status, is_superuser, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await?;
        row.map(to_user).transpose()
    }
}

fn to_user(row: UserRow) -> Result<User, StoreError> {
    User::try_from(row).map_err(StoreError::InvalidRow)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(to_user).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_by("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.fetch_one_by("email", email).await
    }

    async fn insert(&self, candidate: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (username, email, password_hash, full_name, status, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&candidate.username)
            .bind(&candidate.email)
            .bind(&candidate.password_hash)
            .bind(&candidate.full_name)
            .bind(candidate.status.as_str())
            .bind(candidate.is_superuser)
            .fetch_one(&self.db)
            .await?;
        debug!(user_id = row.id, "user row inserted");
        to_user(row)
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<User, StoreError> {
        // Absent fields keep the column value read under the row lock.
        let sql = format!(
            r#"
            UPDATE users
               SET email        = COALESCE($2, email),
                   full_name    = CASE WHEN $3 THEN $4 ELSE full_name END,
                   status       = COALESCE($5, status),
                   is_superuser = COALESCE($6, is_superuser),
                   updated_at   = clock_timestamp()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let (set_full_name, full_name) = match patch.full_name {
            Some(value) => (true, value),
            None => (false, None),
        };
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(patch.email)
            .bind(set_full_name)
            .bind(full_name)
            .bind(patch.status.map(AccountStatus::as_str))
            .bind(patch.is_superuser)
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)?;
        to_user(row)
    }

    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.db)
            .await?;
        rows.into_iter().map(to_user).collect()
    }

    async fn set_status(&self, id: i64, status: AccountStatus) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET status = $2, updated_at = clock_timestamp()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.db)
            .await?
            .ok_or(StoreError::NotFound)?;
        to_user(row)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}
