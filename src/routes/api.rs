use crate::{
    AppState,
    handlers::{diagnostics, get_task, health_check, ready_check, save_task_content},
    routes::auth_middleware::auth_middleware,
};
use axum::{middleware, routing::{get, put}, Router};

/// Create API routes
pub fn create_api_routes(app_state: AppState) -> Router {
    let protected = Router::<AppState>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/tasks/:task_id", get(get_task))
        .route("/v1/tasks/:task_id/content", put(save_task_content))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), auth_middleware)); // Applies to all routes added above

    Router::<AppState>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .merge(protected)
        .with_state(app_state)
}
