use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::users::{
    repo::StoreError,
    repo_types::UniqueField,
    validation::{FieldError, ValidationErrors},
};

/// Why a write collided with an existing account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    UsernameTaken,
    EmailTaken,
    /// The unique index fired but could not be attributed to a column.
    Constraint,
}

impl ConflictReason {
    pub fn message(self) -> &'static str {
        match self {
            ConflictReason::UsernameTaken => "Username already exists",
            ConflictReason::EmailTaken => "Email already registered",
            ConflictReason::Constraint => "Request conflicts with an existing user, please check input data",
        }
    }
}

impl From<Option<UniqueField>> for ConflictReason {
    fn from(field: Option<UniqueField>) -> Self {
        match field {
            Some(UniqueField::Username) => ConflictReason::UsernameTaken,
            Some(UniqueField::Email) => ConflictReason::EmailTaken,
            None => ConflictReason::Constraint,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("{}", .0.message())]
    Conflict(ConflictReason),
    #[error("{0}")]
    NotFound(String),
    #[error("store unavailable")]
    Unavailable(#[source] StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn user_not_found() -> Self {
        AppError::NotFound("User not found".into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::user_not_found(),
            StoreError::UniqueViolation(field) => AppError::Conflict(field.into()),
            StoreError::Unavailable(_) => AppError::Unavailable(e),
            StoreError::Database(_) | StoreError::InvalidRow(_) => AppError::Internal(e.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(errors) => ErrorBody {
                detail: "Validation failed".into(),
                errors: Some(errors.0),
            },
            AppError::Conflict(reason) => ErrorBody {
                detail: reason.message().into(),
                errors: None,
            },
            AppError::NotFound(detail) => ErrorBody { detail, errors: None },
            AppError::Unavailable(e) => {
                error!(error = %e, "store unavailable");
                ErrorBody {
                    detail: "Service temporarily unavailable".into(),
                    errors: None,
                }
            }
            AppError::Internal(e) => {
                error!(error = ?e, "unhandled error");
                ErrorBody {
                    detail: "Internal server error".into(),
                    errors: None,
                }
            }
        };
        (status, Json(body)).into_response()
    }
}
