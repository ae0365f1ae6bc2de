use std::panic;
use std::sync::Arc;

use colabri_live::{
    AppState,
    config::Config,
    db::{DocumentStore, InMemoryDocumentStore},
    routes::create_app,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main(flavor = "current_thread")]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration first, it decides the log level
    let loaded = Config::load();
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // Initialize tracing, RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter().into()))
        .init();

    info!("Starting server...");
    match &loaded {
        Ok(_) => info!("✅ Configuration loaded successfully"),
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            warn!("Using default configuration");
        }
    }

    if config.cloud_auth_jwt_secret.is_none() {
        warn!("No JWT secret configured - every connection and API call will be rejected");
    }

    // Initialize the task store, seeded from file if one is configured
    let store = match &config.tasks_seed_file {
        Some(path) => InMemoryDocumentStore::from_seed_file(path).unwrap_or_else(|e| {
            error!("Failed to seed task store: {}", e);
            warn!("Starting with an empty task store");
            InMemoryDocumentStore::new()
        }),
        None => {
            warn!("No tasks seed file configured - document joins will not be membership checked");
            InMemoryDocumentStore::new()
        }
    };
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let address = config.server_address();
    let app_routes = create_app(AppState::new(config, store));

    // Start the HTTP/WebSocket server
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", address));

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
