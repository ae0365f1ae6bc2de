pub mod api;
pub mod auth_middleware;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{AppState, config::Config, docs::ApiDoc, websocket::websocket_handler};
pub use api::create_api_routes;

/// Build the full application router: websocket endpoint, REST API and docs.
pub fn create_app(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(app_state.clone())
        // Mount API routes
        .nest("/api", create_api_routes(app_state))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    if !origins.is_empty() {
        CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
    } else if config.is_development() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}
