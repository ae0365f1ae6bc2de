pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;
pub mod websocket;
pub mod ws;

use std::sync::Arc;

use config::Config;
use db::DocumentStore;
use ws::broker::RoomBroker;

/// Shared state handed to every route and socket task.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<RoomBroker>,
    pub store: Arc<dyn DocumentStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            broker: Arc::new(RoomBroker::new()),
            store,
            config: Arc::new(config),
        }
    }
}
