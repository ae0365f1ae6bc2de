use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

/// Public profile of a task owner or assignee
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct TaskUser {
    pub id: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskAssignment {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<TaskUser>,
}

/// A task. Its `description` is the shared document body.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    pub user: TaskUser,
    #[serde(default)]
    pub assignments: Vec<TaskAssignment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, owner: TaskUser) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::default(),
            user: owner,
            assignments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Owner first, then assignees, without duplicates.
    pub fn members(&self) -> Vec<String> {
        let mut members = vec![self.user.id.clone()];
        for assignment in &self.assignments {
            if !members.contains(&assignment.user_id) {
                members.push(assignment.user_id.clone());
            }
        }
        members
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.user.id == user_id || self.assignments.iter().any(|a| a.user_id == user_id)
    }
}

impl TaskUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), name: None, image: None }
    }
}
