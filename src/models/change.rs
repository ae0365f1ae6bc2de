use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Insert,
    Delete,
}

/// One local edit, carrying the full resulting text plus the positional
/// metadata receivers use to move their own caret.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDescriptor {
    pub user_id: String,
    pub content: String,
    pub change_type: ChangeType,
    pub change_start: usize,
    pub change_length: usize,
    pub cursor_position: usize,
    pub timestamp: i64,
}
