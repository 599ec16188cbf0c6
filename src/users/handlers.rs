use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    error::ApiError,
    metrics::{MetricName, Metrics},
    state::AppState,
    users::{
        dto::{CreatedUserResponse, MessageResponse, UserPayload},
        repo::StoreError,
        repo_types::User,
        services::validate_user,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route(
            "/api/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

/// Logs a storage outcome and counts it as an API error where it is one.
/// Not-found is an ordinary answer and is neither logged as a fault nor counted.
fn store_failure(metrics: &Metrics, op: &'static str, e: StoreError) -> ApiError {
    match &e {
        StoreError::NotFound => {}
        StoreError::Conflict => {
            warn!(op, "email already exists");
            metrics.emit_count(MetricName::ApiError, 1.0);
        }
        StoreError::Internal(source) => {
            error!(op, error = %source, "storage failure");
            metrics.emit_count(MetricName::ApiError, 1.0);
        }
    }
    ApiError::from(e)
}

fn user_id(id: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    let Path(id) = id.map_err(|e| {
        warn!(error = %e, "invalid user id");
        ApiError::from(e)
    })?;
    Ok(id)
}

fn payload(body: Result<Json<UserPayload>, JsonRejection>) -> Result<UserPayload, ApiError> {
    let Json(payload) = body.map_err(|e| {
        warn!(error = %e, "invalid request body");
        ApiError::from(e)
    })?;
    Ok(payload)
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    let users = state
        .users
        .list_users()
        .await
        .map_err(|e| store_failure(&state.metrics, "list_users", e))?;

    state.metrics.emit_count(MetricName::GetUsers, 1.0);
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<User>, ApiError> {
    let id = user_id(id)?;
    let user = state
        .users
        .get_user(id)
        .await
        .map_err(|e| store_failure(&state.metrics, "get_user", e))?;

    state.metrics.emit_count(MetricName::GetUserById, 1.0);
    Ok(Json(user))
}

#[instrument(skip(state, body))]
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<UserPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedUserResponse>), ApiError> {
    let fields = validate_user(payload(body)?).map_err(|e| {
        warn!(error = %e, "create_user rejected");
        e
    })?;

    let user_id = state
        .users
        .create_user(&fields)
        .await
        .map_err(|e| store_failure(&state.metrics, "create_user", e))?;

    info!(user_id, "user created");
    state.metrics.emit_count(MetricName::CreateUser, 1.0);
    Ok((
        StatusCode::CREATED,
        Json(CreatedUserResponse {
            message: "User created successfully",
            user_id,
        }),
    ))
}

#[instrument(skip(state, body))]
pub async fn update_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<UserPayload>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = user_id(id)?;
    let fields = validate_user(payload(body)?).map_err(|e| {
        warn!(error = %e, id, "update_user rejected");
        e
    })?;

    state
        .users
        .update_user(id, &fields)
        .await
        .map_err(|e| store_failure(&state.metrics, "update_user", e))?;

    info!(id, "user updated");
    state.metrics.emit_count(MetricName::UpdateUser, 1.0);
    Ok(Json(MessageResponse {
        message: "User updated successfully",
    }))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = user_id(id)?;
    state
        .users
        .delete_user(id)
        .await
        .map_err(|e| store_failure(&state.metrics, "delete_user", e))?;

    info!(id, "user deleted");
    state.metrics.emit_count(MetricName::DeleteUser, 1.0);
    Ok(Json(MessageResponse {
        message: "User deleted successfully",
    }))
}
