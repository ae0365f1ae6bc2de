use tracing::{info, warn};

use crate::AppState;
use crate::db::StoreError;
use crate::models::{ErrorMessage, MembershipMessage, ServerMessage};
use crate::ws::{broker::ScopeKey, connctx::ConnCtx};

/// Handle join-document
pub async fn handle_join_document(msg: &MembershipMessage, conn: &ConnCtx, app_state: &AppState) {
    if msg.user_id != conn.user_id {
        warn!(
            "Join for document {} claims user {} but connection {} belongs to {}",
            msg.document_id, msg.user_id, conn.connection_id, conn.user_id
        );
    }

    // Known tasks are only open to their owner and assignees
    match app_state.store.load_document(&msg.document_id).await {
        Ok(task) if !task.is_member(&conn.user_id) => {
            warn!("User {} is not a member of document {}", conn.user_id, msg.document_id);
            conn.send(ServerMessage::Error(ErrorMessage {
                message: format!("Not a member of document '{}'", msg.document_id),
            }));
            return;
        }
        Ok(_) | Err(StoreError::NotFound(_)) => {}
        Err(e) => warn!("Membership lookup for document {} failed: {}", msg.document_id, e),
    }

    let scope = ScopeKey::Document(msg.document_id.clone());
    if app_state.broker.join(scope, conn.connection_id, &conn.user_id).await {
        info!("User {} joined document {}", conn.user_id, msg.document_id);
    }
}

/// Handle leave-document
pub async fn handle_leave_document(msg: &MembershipMessage, conn: &ConnCtx, app_state: &AppState) {
    let scope = ScopeKey::Document(msg.document_id.clone());
    if app_state.broker.leave(&scope, conn.connection_id, &conn.user_id).await {
        info!("User {} left document {}", conn.user_id, msg.document_id);
    }
}
