use serde::{Deserialize, Serialize};
use crate::models::{ChangeDescriptor, Indicator, Task};

/// Membership change on a document channel
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipMessage {
    pub document_id: String,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentChangeMessage {
    pub document_id: String,
    pub change: ChangeDescriptor,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorUpdateMessage {
    pub document_id: String,
    pub indicator: Indicator,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskMessage {
    pub task: Task,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMessage {
    pub connection_id: String,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PongMessage {
    pub date: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub message: String,
}

/// Frames sent by a client to the broker
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinDocument(MembershipMessage),
    LeaveDocument(MembershipMessage),
    ContentChange(ContentChangeMessage),
    IndicatorUpdate(IndicatorUpdateMessage),
    TaskCreated(TaskMessage),
    TaskUpdated(TaskMessage),
    TaskDeleted(TaskMessage),
    Ping,
}

/// Frames sent by the broker to a client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Connected(ConnectedMessage),
    UserJoin(MembershipMessage),
    UserLeave(MembershipMessage),
    ContentChange(ContentChangeMessage),
    IndicatorUpdate(IndicatorUpdateMessage),
    TaskCreated(TaskMessage),
    TaskUpdated(TaskMessage),
    TaskDeleted(TaskMessage),
    Pong(PongMessage),
    Error(ErrorMessage),
}

impl ServerMessage {
    /// Name a client subscribes to for this frame. Document-scoped events are
    /// prefixed with their document id so one session can multiplex several
    /// open documents.
    pub fn event_name(&self) -> String {
        match self {
            ServerMessage::Connected(_) => "connected".to_string(),
            ServerMessage::UserJoin(m) => document_event(&m.document_id, "user-join"),
            ServerMessage::UserLeave(m) => document_event(&m.document_id, "user-leave"),
            ServerMessage::ContentChange(m) => document_event(&m.document_id, "content-change"),
            ServerMessage::IndicatorUpdate(m) => document_event(&m.document_id, "indicator-update"),
            ServerMessage::TaskCreated(_) => "task-created".to_string(),
            ServerMessage::TaskUpdated(_) => "task-updated".to_string(),
            ServerMessage::TaskDeleted(_) => "task-deleted".to_string(),
            ServerMessage::Pong(_) => "pong".to_string(),
            ServerMessage::Error(_) => "error".to_string(),
        }
    }
}

/// `"{document_id}:{event}"`
pub fn document_event(document_id: &str, event: &str) -> String {
    format!("{}:{}", document_id, event)
}
