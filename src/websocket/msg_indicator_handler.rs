use tracing::warn;

use crate::AppState;
use crate::models::{IndicatorUpdateMessage, ServerMessage};
use crate::ws::{broker::ScopeKey, connctx::ConnCtx};

/// Handle indicator-update - relay to the other members of the document
pub async fn handle_indicator_update(mut msg: IndicatorUpdateMessage, conn: &ConnCtx, app_state: &AppState) {
    let scope = ScopeKey::Document(msg.document_id.clone());
    if !app_state.broker.is_member(&scope, conn.connection_id).await {
        warn!(
            "Dropping indicator-update for document {} from non-member connection {}",
            msg.document_id, conn.connection_id
        );
        return;
    }
    msg.indicator.user_id = conn.user_id.clone();

    app_state
        .broker
        .relay(&scope, ServerMessage::IndicatorUpdate(msg), Some(conn.connection_id))
        .await;
}
