//! Scope-keyed channel membership and fan-out.
//!
//! A channel exists while it has members. Every channel serializes its own
//! fan-out behind a mutex so all members observe events in the order the
//! broker received them; different channels never share a lock while
//! delivering.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connctx::ConnCtx;
use crate::models::{MembershipMessage, ServerMessage};

/// Routing scope of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// Everyone viewing one document
    Document(String),
    /// Every connection of one user
    User(String),
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Document(id) => write!(f, "document:{}", id),
            ScopeKey::User(id) => write!(f, "user:{}", id),
        }
    }
}

struct Member {
    user_id: String,
    conn: Arc<ConnCtx>,
}

#[derive(Default)]
struct Channel {
    members: HashMap<Uuid, Member>,
}

impl Channel {
    fn fan_out(&self, msg: &ServerMessage, exclude: Option<Uuid>) -> usize {
        let mut delivered = 0;
        for (connection_id, member) in &self.members {
            if Some(*connection_id) == exclude {
                continue;
            }
            if member.conn.send(msg.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    fn has_user(&self, user_id: &str) -> bool {
        self.members.values().any(|m| m.user_id == user_id)
    }
}

/// Snapshot of broker state for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub connections: usize,
    pub channels: usize,
    pub document_channels: usize,
    pub user_channels: usize,
    pub relayed: u64,
}

pub struct RoomBroker {
    channels: RwLock<HashMap<ScopeKey, Arc<Mutex<Channel>>>>,
    connections: RwLock<HashMap<Uuid, Arc<ConnCtx>>>,
    relayed: AtomicU64,
}

impl RoomBroker {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            relayed: AtomicU64::new(0),
        }
    }

    /// Track a new connection and subscribe it to its user's channel.
    pub async fn register(&self, conn: Arc<ConnCtx>) {
        let connection_id = conn.connection_id;
        let user_id = conn.user_id.clone();
        let total = {
            let mut connections = self.connections.write().await;
            connections.insert(connection_id, conn);
            connections.len()
        };
        self.join(ScopeKey::User(user_id.clone()), connection_id, &user_id).await;
        info!(
            connection_id = %connection_id,
            user_id = %user_id,
            total_connections = total,
            "Connection registered"
        );
    }

    /// Add a connection to a channel, creating the channel if needed.
    ///
    /// Document channels announce the joiner to the other members. Returns
    /// false if the connection was already a member (nothing is re-sent) or is
    /// not registered.
    pub async fn join(&self, scope: ScopeKey, connection_id: Uuid, user_id: &str) -> bool {
        let conn = match self.connections.read().await.get(&connection_id) {
            Some(conn) => conn.clone(),
            None => {
                warn!(connection_id = %connection_id, scope = %scope, "Join from unknown connection");
                return false;
            }
        };

        let mut channels = self.channels.write().await;
        let channel = channels.entry(scope.clone()).or_default().clone();
        let mut channel = channel.lock().await;
        if channel.members.contains_key(&connection_id) {
            debug!(connection_id = %connection_id, scope = %scope, "Already a member");
            return false;
        }
        let user_present = channel.has_user(user_id);
        channel.members.insert(connection_id, Member { user_id: user_id.to_string(), conn });

        // Announced on a user's first connection only
        match &scope {
            ScopeKey::Document(document_id) if !user_present => {
                let notice = ServerMessage::UserJoin(MembershipMessage {
                    document_id: document_id.clone(),
                    user_id: user_id.to_string(),
                });
                channel.fan_out(&notice, Some(connection_id));
            }
            _ => {}
        }
        debug!(
            connection_id = %connection_id,
            scope = %scope,
            room_size = channel.members.len(),
            "Connection joined channel"
        );
        true
    }

    /// Remove a connection from a channel. Document channels tell the remaining
    /// members who left. Empty channels are dropped.
    pub async fn leave(&self, scope: &ScopeKey, connection_id: Uuid, user_id: &str) -> bool {
        let mut channels = self.channels.write().await;
        let Some(channel) = channels.get(scope).cloned() else {
            return false;
        };
        let mut channel = channel.lock().await;
        if channel.members.remove(&connection_id).is_none() {
            return false;
        }
        Self::announce_leave(scope, &channel, user_id);
        if channel.members.is_empty() {
            channels.remove(scope);
            debug!(scope = %scope, "Removed empty channel");
        }
        true
    }

    /// Deliver `msg` to every member of `scope` except `exclude`.
    ///
    /// A scope with no members is a no-op. Returns the number of connections
    /// the frame was queued for.
    pub async fn relay(&self, scope: &ScopeKey, msg: ServerMessage, exclude: Option<Uuid>) -> usize {
        let channel = match self.channels.read().await.get(scope) {
            Some(channel) => channel.clone(),
            None => {
                debug!(scope = %scope, "No channel for scope - nothing to relay");
                return 0;
            }
        };
        let delivered = channel.lock().await.fan_out(&msg, exclude);
        self.relayed.fetch_add(1, Ordering::Relaxed);
        debug!(scope = %scope, recipients = delivered, "Relayed event");
        delivered
    }

    /// Drop a connection from every channel it belongs to. Called on teardown so
    /// no membership outlives its connection.
    pub async fn remove_connection(&self, connection_id: Uuid) {
        let removed = self.connections.write().await.remove(&connection_id);

        let mut left = 0;
        let mut channels = self.channels.write().await;
        let mut emptied = Vec::new();
        for (scope, channel) in channels.iter() {
            let mut channel = channel.lock().await;
            if let Some(member) = channel.members.remove(&connection_id) {
                left += 1;
                Self::announce_leave(scope, &channel, &member.user_id);
                if channel.members.is_empty() {
                    emptied.push(scope.clone());
                }
            }
        }
        for scope in &emptied {
            channels.remove(scope);
        }

        if let Some(conn) = removed {
            info!(
                connection_id = %connection_id,
                user_id = %conn.user_id,
                channels_left = left,
                "Connection removed"
            );
        }
    }

    /// Tell the remaining members, once the user's last connection is gone.
    fn announce_leave(scope: &ScopeKey, channel: &Channel, user_id: &str) {
        if channel.has_user(user_id) {
            return;
        }
        if let ScopeKey::Document(document_id) = scope {
            let notice = ServerMessage::UserLeave(MembershipMessage {
                document_id: document_id.clone(),
                user_id: user_id.to_string(),
            });
            channel.fan_out(&notice, None);
        }
    }

    pub async fn is_member(&self, scope: &ScopeKey, connection_id: Uuid) -> bool {
        let channel = self.channels.read().await.get(scope).cloned();
        match channel {
            Some(channel) => channel.lock().await.members.contains_key(&connection_id),
            None => false,
        }
    }

    /// Distinct users currently in `scope`.
    pub async fn member_users(&self, scope: &ScopeKey) -> Vec<String> {
        let channel = self.channels.read().await.get(scope).cloned();
        let Some(channel) = channel else {
            return Vec::new();
        };
        let channel = channel.lock().await;
        let mut users: Vec<String> = channel.members.values().map(|m| m.user_id.clone()).collect();
        users.sort();
        users.dedup();
        users
    }

    pub async fn member_count(&self, scope: &ScopeKey) -> usize {
        let channel = self.channels.read().await.get(scope).cloned();
        match channel {
            Some(channel) => channel.lock().await.members.len(),
            None => 0,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn stats(&self) -> BrokerStats {
        let connections = self.connection_count().await;
        let channels = self.channels.read().await;
        let document_channels = channels.keys().filter(|k| matches!(k, ScopeKey::Document(_))).count();
        BrokerStats {
            connections,
            channels: channels.len(),
            document_channels,
            user_channels: channels.len() - document_channels,
            relayed: self.relayed.load(Ordering::Relaxed),
        }
    }
}

impl Default for RoomBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorMessage, IndicatorUpdateMessage, Indicator};
    use tokio::sync::mpsc;

    async fn connect(
        broker: &RoomBroker,
        user_id: &str,
    ) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(ConnCtx::new(user_id, tx));
        let id = conn.connection_id;
        broker.register(conn).await;
        (id, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn doc(id: &str) -> ScopeKey {
        ScopeKey::Document(id.to_string())
    }

    #[tokio::test]
    async fn test_join_announces_to_others_only() {
        let broker = RoomBroker::new();
        let (a, mut rx_a) = connect(&broker, "A").await;
        let (b, mut rx_b) = connect(&broker, "B").await;

        assert!(broker.join(doc("doc1"), b, "B").await);
        assert!(broker.join(doc("doc1"), a, "A").await);

        let to_b = drain(&mut rx_b);
        assert_eq!(to_b.len(), 1);
        match &to_b[0] {
            ServerMessage::UserJoin(m) => {
                assert_eq!(m.user_id, "A");
                assert_eq!(m.document_id, "doc1");
            }
            other => panic!("Expected UserJoin, got {other:?}"),
        }
        assert!(drain(&mut rx_a).is_empty());

        assert!(broker.leave(&doc("doc1"), a, "A").await);
        let to_b = drain(&mut rx_b);
        assert!(matches!(&to_b[..], [ServerMessage::UserLeave(m)] if m.user_id == "A"));
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let broker = RoomBroker::new();
        let (a, _rx_a) = connect(&broker, "A").await;
        let (b, mut rx_b) = connect(&broker, "B").await;
        broker.join(doc("doc1"), b, "B").await;

        assert!(broker.join(doc("doc1"), a, "A").await);
        assert!(!broker.join(doc("doc1"), a, "A").await);

        assert_eq!(broker.member_count(&doc("doc1")).await, 2);
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn test_relay_excludes_sender() {
        let broker = RoomBroker::new();
        let mut peers = Vec::new();
        for name in ["A", "B", "C", "D"] {
            let (id, rx) = connect(&broker, name).await;
            broker.join(doc("doc1"), id, name).await;
            peers.push((id, rx));
        }
        for (_, rx) in peers.iter_mut() {
            drain(rx);
        }

        let sender = peers[0].0;
        let msg = ServerMessage::IndicatorUpdate(IndicatorUpdateMessage {
            document_id: "doc1".to_string(),
            indicator: Indicator::cursor("A", "#FF5733", 3),
        });
        let delivered = broker.relay(&doc("doc1"), msg, Some(sender)).await;
        assert_eq!(delivered, 3);

        assert!(drain(&mut peers[0].1).is_empty());
        for (_, rx) in peers.iter_mut().skip(1) {
            assert_eq!(drain(rx).len(), 1);
        }
    }

    #[tokio::test]
    async fn test_relay_to_unknown_scope_is_noop() {
        let broker = RoomBroker::new();
        let msg = ServerMessage::Error(ErrorMessage { message: "x".to_string() });
        assert_eq!(broker.relay(&doc("nowhere"), msg, None).await, 0);
        assert_eq!(broker.stats().await.channels, 0);
    }

    #[tokio::test]
    async fn test_remove_connection_leaves_everything() {
        let broker = RoomBroker::new();
        let (a, _rx_a) = connect(&broker, "A").await;
        let (b, mut rx_b) = connect(&broker, "B").await;
        for id in ["doc1", "doc2"] {
            broker.join(doc(id), b, "B").await;
            broker.join(doc(id), a, "A").await;
        }
        drain(&mut rx_b);

        broker.remove_connection(a).await;

        let to_b = drain(&mut rx_b);
        assert_eq!(to_b.len(), 2);
        assert!(to_b.iter().all(|m| matches!(m, ServerMessage::UserLeave(l) if l.user_id == "A")));
        assert!(!broker.is_member(&doc("doc1"), a).await);
        assert!(!broker.is_member(&ScopeKey::User("A".to_string()), a).await);
        assert_eq!(broker.member_users(&doc("doc2")).await, vec!["B".to_string()]);

        let stats = broker.stats().await;
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.document_channels, 2);
        assert_eq!(stats.user_channels, 1);
    }

    #[tokio::test]
    async fn test_net_membership_after_mixed_joins_and_leaves() {
        let broker = RoomBroker::new();
        let (a, _ra) = connect(&broker, "A").await;
        let (b, _rb) = connect(&broker, "B").await;
        let (c, _rc) = connect(&broker, "C").await;

        broker.join(doc("d"), a, "A").await;
        broker.join(doc("d"), b, "B").await;
        broker.join(doc("d"), a, "A").await;
        broker.leave(&doc("d"), b, "B").await;
        broker.leave(&doc("d"), b, "B").await;
        broker.join(doc("d"), c, "C").await;
        broker.leave(&doc("d"), a, "A").await;

        assert_eq!(broker.member_users(&doc("d")).await, vec!["C".to_string()]);

        broker.leave(&doc("d"), c, "C").await;
        assert_eq!(broker.member_count(&doc("d")).await, 0);
        assert_eq!(broker.stats().await.document_channels, 0);
    }

    #[tokio::test]
    async fn test_second_connection_of_user_is_not_announced() {
        let broker = RoomBroker::new();
        let (a1, _ra1) = connect(&broker, "A").await;
        let (a2, _ra2) = connect(&broker, "A").await;
        let (b, mut rx_b) = connect(&broker, "B").await;
        broker.join(doc("doc1"), b, "B").await;

        broker.join(doc("doc1"), a1, "A").await;
        broker.join(doc("doc1"), a2, "A").await;
        let to_b = drain(&mut rx_b);
        assert!(matches!(&to_b[..], [ServerMessage::UserJoin(m)] if m.user_id == "A"));

        // One tab closes, A is still there
        broker.leave(&doc("doc1"), a1, "A").await;
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(broker.member_users(&doc("doc1")).await, vec!["A".to_string(), "B".to_string()]);

        broker.remove_connection(a2).await;
        let to_b = drain(&mut rx_b);
        assert!(matches!(&to_b[..], [ServerMessage::UserLeave(m)] if m.user_id == "A"));
    }

    #[tokio::test]
    async fn test_user_scope_reaches_every_connection_of_user() {
        let broker = RoomBroker::new();
        let (_a1, mut rx1) = connect(&broker, "A").await;
        let (_a2, mut rx2) = connect(&broker, "A").await;
        let (_b, mut rx_b) = connect(&broker, "B").await;

        let msg = ServerMessage::Error(ErrorMessage { message: "hi".to_string() });
        let delivered = broker.relay(&ScopeKey::User("A".to_string()), msg, None).await;

        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
        assert!(drain(&mut rx_b).is_empty());
    }
}
