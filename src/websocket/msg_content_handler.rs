use tracing::warn;

use crate::AppState;
use crate::models::{ContentChangeMessage, ServerMessage};
use crate::ws::{broker::ScopeKey, connctx::ConnCtx};

/// Handle content-change - relay to the other members of the document
pub async fn handle_content_change(mut msg: ContentChangeMessage, conn: &ConnCtx, app_state: &AppState) {
    let scope = ScopeKey::Document(msg.document_id.clone());
    if !app_state.broker.is_member(&scope, conn.connection_id).await {
        warn!(
            "Dropping content-change for document {} from non-member connection {}",
            msg.document_id, conn.connection_id
        );
        return;
    }

    // Receivers use the author id to ignore their own edits
    if msg.change.user_id != conn.user_id {
        warn!("Rewriting content-change author {} to {}", msg.change.user_id, conn.user_id);
        msg.change.user_id = conn.user_id.clone();
    }

    app_state
        .broker
        .relay(&scope, ServerMessage::ContentChange(msg), Some(conn.connection_id))
        .await;
}
