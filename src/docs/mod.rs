use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Broker and host diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics snapshot", body = DiagnosticsResponse),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Load a task
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{task_id}",
    params(
        ("task_id" = String, Path, description = "Task id")
    ),
    responses(
        (status = 200, description = "Task found", body = Task),
        (status = 403, description = "Caller is not a member of the task", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn get_task_doc() {}

/// Save a task body
#[utoipa::path(
    put,
    path = "/api/v1/tasks/{task_id}/content",
    params(
        ("task_id" = String, Path, description = "Task id")
    ),
    request_body = SaveContentRequest,
    responses(
        (status = 200, description = "Content saved", body = Task),
        (status = 403, description = "Caller is not a member of the task", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn save_task_content_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        get_task_doc,
        save_task_content_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            DiagnosticsResponse,
            ErrorResponse,
            SaveContentRequest,
            Task,
            TaskUser,
            TaskAssignment,
            TaskStatus
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
