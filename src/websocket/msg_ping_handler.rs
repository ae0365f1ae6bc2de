use tracing::debug;
use chrono::Utc;
use crate::models::{PongMessage, ServerMessage};
use crate::ws::connctx::ConnCtx;

/// Handle ping - reply with pong to the sender only
pub fn handle_ping_message(conn: &ConnCtx) {
    debug!("Ping received from connection {}", conn.connection_id);
    conn.send(ServerMessage::Pong(PongMessage { date: Utc::now().to_rfc3339() }));
}
