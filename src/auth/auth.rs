use axum::{http::StatusCode, Json};
use thiserror::Error;
use crate::models::{ErrorResponse, Task};

/// Token type allowed to open sessions and call the task API
pub const USER_TOKEN_TYPE: &str = "user";

/// Authenticated user id, placed in request extensions by the auth middleware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser(pub String);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header, auth_token cookie or token parameter")]
    MissingToken,
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("No JWT secret configured")]
    MissingSecret,
    #[error("Unsupported token type '{0}'")]
    UnsupportedTokenType(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingSecret => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Owner or assignee of the task, else 403.
pub fn ensure_task_member(task: &Task, user_id: &str) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if task.is_member(user_id) {
        return Ok(());
    }
    Err(ErrorResponse::reply(
        StatusCode::FORBIDDEN,
        format!("User is not a member of task '{}'", task.id),
    ))
}
