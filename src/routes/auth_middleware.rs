use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::{error, info};
use crate::AppState;
use crate::auth::AuthUser;
use crate::services::auth_service::{authenticated_user_id, get_auth_token};

pub async fn auth_middleware(
    State(app_state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {

    // 1. Get the auth token from the request
    let token = get_auth_token(req.headers(), None).map_err(|e| {
        error!("No auth token on request: {}", e);
        e.status()
    })?;

    // 2. Validate it and resolve the user
    let user_id = authenticated_user_id(&token, app_state.config.cloud_auth_jwt_secret.as_deref())
        .map_err(|e| e.status())?;
    info!("User token validated successfully");

    // 3. Hand the user to downstream handlers
    req.extensions_mut().insert(AuthUser(user_id));

    Ok(next.run(req).await)
}
