//! Task document persistence seam.
//!
//! The collaboration core never persists anything itself; the surrounding
//! application loads a task body when a view opens and saves it on demand.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::models::Task;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Task '{0}' not found")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Backend(String),
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// `loadDocument` / `saveDocument`
pub trait DocumentStore: Send + Sync {
    fn load_document<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Task>;

    /// Replace the task body, returning the updated task.
    fn save_document<'a>(&'a self, id: &'a str, content: &'a str) -> StoreFuture<'a, Task>;
}

/// Process-local store, for development and tests.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self { tasks: RwLock::new(tasks) }
    }

    /// Load seed tasks from a JSON array on disk.
    pub fn from_seed_file(path: &str) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Backend(format!("Failed to read '{}': {}", path, e)))?;
        let tasks: Vec<Task> = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Backend(format!("Failed to parse '{}': {}", path, e)))?;
        info!("Seeded {} tasks from {}", tasks.len(), path);
        Ok(Self::with_tasks(tasks))
    }

    pub async fn insert(&self, task: Task) {
        self.tasks.write().await.insert(task.id.clone(), task);
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn load_document<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Task> {
        Box::pin(async move {
            self.tasks
                .read()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
    }

    fn save_document<'a>(&'a self, id: &'a str, content: &'a str) -> StoreFuture<'a, Task> {
        Box::pin(async move {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            task.description = content.to_string();
            task.updated_at = Utc::now();
            Ok(task.clone())
        })
    }
}
