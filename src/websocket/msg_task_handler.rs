use tracing::{error, info, warn};

use crate::AppState;
use crate::db::StoreError;
use crate::models::{ErrorMessage, ServerMessage, TaskMessage};
use crate::ws::{broker::ScopeKey, connctx::ConnCtx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Created,
    Updated,
    Deleted,
}

/// Handle task-created/updated/deleted - deliver the task to the owner and
/// every assignee on their user channels, sender included.
///
/// A task the store knows is authorized against the stored copy, and its
/// stored members are notified as well, so dropped assignees hear about it.
/// Tasks unknown to the store are authorized against the frame itself.
pub async fn handle_task_message(event: TaskEvent, msg: TaskMessage, conn: &ConnCtx, app_state: &AppState) {
    let stored = match app_state.store.load_document(&msg.task.id).await {
        Ok(task) => Some(task),
        Err(StoreError::NotFound(_)) => None,
        Err(e) => {
            error!("Task lookup for {} failed: {}", msg.task.id, e);
            conn.send(ServerMessage::Error(ErrorMessage {
                message: format!("Could not verify task '{}'", msg.task.id),
            }));
            return;
        }
    };

    let authority = stored.as_ref().unwrap_or(&msg.task);
    if !authority.is_member(&conn.user_id) {
        warn!("User {} sent {:?} for task {} they are not part of", conn.user_id, event, msg.task.id);
        conn.send(ServerMessage::Error(ErrorMessage {
            message: format!("Not a member of task '{}'", msg.task.id),
        }));
        return;
    }

    let mut recipients = msg.task.members();
    for user_id in stored.iter().flat_map(|task| task.members()) {
        if !recipients.contains(&user_id) {
            recipients.push(user_id);
        }
    }
    info!("Task {} {:?}: notifying {} users", msg.task.id, event, recipients.len());

    let frame = match event {
        TaskEvent::Created => ServerMessage::TaskCreated(msg),
        TaskEvent::Updated => ServerMessage::TaskUpdated(msg),
        TaskEvent::Deleted => ServerMessage::TaskDeleted(msg),
    };
    for user_id in recipients {
        app_state.broker.relay(&ScopeKey::User(user_id), frame.clone(), None).await;
    }
}
