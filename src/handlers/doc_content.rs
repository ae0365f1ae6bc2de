use crate::{
    AppState,
    auth::{self, AuthUser},
    db::StoreError,
    models::{ErrorResponse, SaveContentRequest, Task},
};
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info};

fn store_error(task_id: &str, e: StoreError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        StoreError::NotFound(_) => ErrorResponse::reply(StatusCode::NOT_FOUND, format!("Task '{}' not found", task_id)),
        StoreError::Backend(msg) => {
            error!("Store failure for task '{}': {}", task_id, msg);
            ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to access task '{}'", task_id))
        }
    }
}

/// Load a task and its body
pub async fn get_task(
    State(app_state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(task_id): Path<String>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, Json<ErrorResponse>)> {
    let task = app_state
        .store
        .load_document(&task_id)
        .await
        .map_err(|e| store_error(&task_id, e))?;

    auth::ensure_task_member(&task, &user_id)?;

    Ok((StatusCode::OK, Json(task)))
}

/// Save a task body
pub async fn save_task_content(
    State(app_state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(task_id): Path<String>,
    Json(request): Json<SaveContentRequest>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, Json<ErrorResponse>)> {
    let task = app_state
        .store
        .load_document(&task_id)
        .await
        .map_err(|e| store_error(&task_id, e))?;
    auth::ensure_task_member(&task, &user_id)?;

    let task = app_state
        .store
        .save_document(&task_id, &request.content)
        .await
        .map_err(|e| store_error(&task_id, e))?;
    info!("Task '{}' content saved by {} ({} chars)", task_id, user_id, request.content.chars().count());

    Ok((StatusCode::OK, Json(task)))
}
