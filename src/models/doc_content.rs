use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request payload for saving a task body
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SaveContentRequest {
    pub content: String,
}
