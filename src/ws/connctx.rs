use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::models::ServerMessage;

/// One live websocket connection as the broker sees it.
#[derive(Debug)]
pub struct ConnCtx {
    pub connection_id: Uuid,
    /// Authenticated user behind the connection
    pub user_id: String,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnCtx {
    pub fn new(user_id: impl Into<String>, sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            user_id: user_id.into(),
            sender,
        }
    }

    /// Queue a frame for this connection's writer task.
    ///
    /// Returns false when the writer is gone; the connection will be cleaned
    /// up by its own teardown.
    pub fn send(&self, msg: ServerMessage) -> bool {
        match self.sender.send(msg) {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    connection_id = %self.connection_id,
                    "Failed to queue frame for connection (likely closed)"
                );
                false
            }
        }
    }
}
