use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tracing::instrument;

use crate::{
    errors::AppError,
    extract::{Json, UserId},
    state::AppState,
    users::dto::{CreateUserRequest, UpdateUserRequest, UserResponse},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", post(create_user).get(list_users))
        .route("/api/users/", post(create_user).get(list_users))
        .route(
            "/api/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/users/search/by-username/:username", get(get_user_by_username))
        .route("/api/users/:id/activate", post(activate_user))
        .route("/api/users/:id/deactivate", post(deactivate_user))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = state.accounts.create(payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = state.accounts.list().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    UserId(id): UserId,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(state.accounts.get(id).await?.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    UserId(id): UserId,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(state.accounts.update(id, payload).await?.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    UserId(id): UserId,
) -> Result<StatusCode, AppError> {
    state.accounts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_user_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(state.accounts.get_by_username(&username).await?.into()))
}

#[instrument(skip(state))]
pub async fn activate_user(
    State(state): State<AppState>,
    UserId(id): UserId,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(state.accounts.activate(id).await?.into()))
}

#[instrument(skip(state))]
pub async fn deactivate_user(
    State(state): State<AppState>,
    UserId(id): UserId,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(state.accounts.deactivate(id).await?.into()))
}
