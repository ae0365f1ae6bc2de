//! One persistent websocket connection to the broker, shared by every
//! document view of a client.

use std::collections::{BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use futures_util::{SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::utils::ScopeGuard;
use crate::models::{
    ChangeDescriptor, ClientMessage, ConnectedMessage, ContentChangeMessage, Indicator,
    IndicatorUpdateMessage, MembershipMessage, ServerMessage, Task, TaskMessage,
};

pub const DISCONNECTED_EVENT: &str = "disconnected";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session is not connected")]
    NotConnected,
    #[error("Session is still connecting")]
    Connecting,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Timed out waiting for the server")]
    Timeout,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Websocket endpoint, e.g. `ws://localhost:3000/ws`
    pub url: String,
    pub token: String,
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    fn request_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.url, separator, self.token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What a handler is called with.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Server(ServerMessage),
    Disconnected,
}

impl SessionEvent {
    pub fn name(&self) -> String {
        match self {
            SessionEvent::Server(msg) => msg.event_name(),
            SessionEvent::Disconnected => DISCONNECTED_EVENT.to_string(),
        }
    }
}

pub type EventHandler = Arc<dyn Fn(SessionEvent) + Send + Sync>;

struct Link {
    state: SessionState,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    identity: Option<ConnectedMessage>,
    generation: u64,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    config: SessionConfig,
    handlers: Mutex<HashMap<String, EventHandler>>,
    link: Mutex<Link>,
    joined: Mutex<BTreeSet<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn dispatch(&self, event: SessionEvent) {
        let name = event.name();
        // Cloned out so a handler may call on/off without deadlocking
        let handler = lock(&self.handlers).get(&name).cloned();
        let Some(handler) = handler else {
            debug!("No handler for event '{}'", name);
            return;
        };
        // A failing handler drops its event, not the connection
        if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            error!("Handler for '{}' panicked, event dropped", name);
        }
    }

    /// Flip a live connection to disconnected. Only the first caller for a
    /// given connection fires the `disconnected` event.
    fn mark_disconnected(&self, generation: u64) {
        {
            let mut link = lock(&self.link);
            if link.generation != generation || link.state != SessionState::Connected {
                return;
            }
            link.state = SessionState::Disconnected;
            link.outbound = None;
            link.identity = None;
        }
        info!("Session disconnected");
        self.dispatch(SessionEvent::Disconnected);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for task in lock(&self.link).tasks.drain(..) {
            task.abort();
        }
    }
}

/// Cheap to clone; clones share the connection and the handler table.
#[derive(Clone)]
pub struct ConnectionSession {
    inner: Arc<Inner>,
}

impl ConnectionSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                handlers: Mutex::new(HashMap::new()),
                link: Mutex::new(Link {
                    state: SessionState::Disconnected,
                    outbound: None,
                    identity: None,
                    generation: 0,
                    tasks: Vec::new(),
                }),
                joined: Mutex::new(BTreeSet::new()),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner.link).state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// User the server authenticated this connection as.
    pub fn user_id(&self) -> Option<String> {
        lock(&self.inner.link).identity.as_ref().map(|id| id.user_id.clone())
    }

    pub fn connection_id(&self) -> Option<String> {
        lock(&self.inner.link).identity.as_ref().map(|id| id.connection_id.clone())
    }

    /// Open the connection and wait for the server's welcome.
    ///
    /// Returns `Ok` at once when already connected. Fails with
    /// `SessionError::Connecting` while another call is still opening the
    /// transport, since nothing can be sent yet.
    pub async fn connect(&self) -> Result<(), SessionError> {
        {
            let mut link = lock(&self.inner.link);
            match link.state {
                SessionState::Connected => {
                    debug!("connect() while connected, ignoring");
                    return Ok(());
                }
                SessionState::Connecting => return Err(SessionError::Connecting),
                SessionState::Disconnected => link.state = SessionState::Connecting,
            }
        }

        match self.open().await {
            Ok(identity) => {
                info!("Session connected as {} ({})", identity.user_id, identity.connection_id);
                self.inner.dispatch(SessionEvent::Server(ServerMessage::Connected(identity)));
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect to {}: {}", self.inner.config.url, e);
                lock(&self.inner.link).state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<ConnectedMessage, SessionError> {
        let config = &self.inner.config;
        let (socket, _) = timeout(config.connect_timeout, connect_async(config.request_url()))
            .await
            .map_err(|_| SessionError::Timeout)?
            .map_err(|e| SessionError::Handshake(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let identity = match timeout(config.connect_timeout, next_server_message(&mut stream))
            .await
            .map_err(|_| SessionError::Timeout)??
        {
            ServerMessage::Connected(identity) => identity,
            other => {
                return Err(SessionError::Handshake(format!(
                    "expected 'connected', got '{}'",
                    other.event_name()
                )))
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    warn!("Failed to write frame: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let mut link = lock(&self.inner.link);
        link.generation += 1;
        let generation = link.generation;

        let inner = Arc::downgrade(&self.inner);
        let reader = tokio::spawn(async move {
            // However the reader ends, the session must learn the link is gone
            let teardown = {
                let inner = inner.clone();
                ScopeGuard::new(move || {
                    if let Some(inner) = inner.upgrade() {
                        inner.mark_disconnected(generation);
                    }
                })
            };
            while let Some(frame) = stream.next().await {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(msg) => inner.dispatch(SessionEvent::Server(msg)),
                        Err(e) => warn!("Discarding unparseable frame: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Connection lost: {}", e);
                        break;
                    }
                }
            }
            drop(teardown);
        });

        for task in link.tasks.drain(..) {
            task.abort();
        }
        link.tasks = vec![writer, reader];
        link.state = SessionState::Connected;
        link.outbound = Some(tx);
        link.identity = Some(identity.clone());
        Ok(identity)
    }

    /// Close the connection. The server leaves every channel on our behalf.
    pub async fn disconnect(&self) {
        let generation = {
            let link = lock(&self.inner.link);
            if link.state != SessionState::Connected {
                return;
            }
            if let Some(outbound) = &link.outbound {
                let _ = outbound.send(Message::Close(None));
            }
            link.generation
        };
        lock(&self.inner.joined).clear();
        self.inner.mark_disconnected(generation);
    }

    /// Register the handler for `event`, replacing any previous one.
    pub fn on(&self, event: impl Into<String>, handler: impl Fn(SessionEvent) + Send + Sync + 'static) {
        lock(&self.inner.handlers).insert(event.into(), Arc::new(handler));
    }

    pub fn off(&self, event: &str) {
        lock(&self.inner.handlers).remove(event);
    }

    pub fn has_handler(&self, event: &str) -> bool {
        lock(&self.inner.handlers).contains_key(event)
    }

    pub fn send(&self, msg: &ClientMessage) -> Result<(), SessionError> {
        let json = serde_json::to_string(msg)?;
        let link = lock(&self.inner.link);
        let outbound = match (&link.state, &link.outbound) {
            (SessionState::Connected, Some(outbound)) => outbound,
            _ => return Err(SessionError::NotConnected),
        };
        outbound
            .send(Message::Text(json.into()))
            .map_err(|_| SessionError::NotConnected)
    }

    pub fn join_document(&self, document_id: &str, user_id: &str) -> Result<(), SessionError> {
        self.send(&ClientMessage::JoinDocument(MembershipMessage {
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
        }))?;
        lock(&self.inner.joined).insert(document_id.to_string());
        Ok(())
    }

    pub fn leave_document(&self, document_id: &str, user_id: &str) -> Result<(), SessionError> {
        lock(&self.inner.joined).remove(document_id);
        self.send(&ClientMessage::LeaveDocument(MembershipMessage {
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
        }))
    }

    /// Documents joined and not left, kept across a transport loss.
    pub fn joined_documents(&self) -> Vec<String> {
        lock(&self.inner.joined).iter().cloned().collect()
    }

    /// Join everything in `joined_documents()` again, after a reconnect.
    pub fn rejoin_documents(&self) -> Result<usize, SessionError> {
        let user_id = self.user_id().ok_or(SessionError::NotConnected)?;
        let documents = self.joined_documents();
        for document_id in &documents {
            self.join_document(document_id, &user_id)?;
        }
        Ok(documents.len())
    }

    pub fn send_content_change(&self, document_id: &str, change: ChangeDescriptor) -> Result<(), SessionError> {
        self.send(&ClientMessage::ContentChange(ContentChangeMessage {
            document_id: document_id.to_string(),
            change,
        }))
    }

    pub fn send_indicator(&self, document_id: &str, indicator: Indicator) -> Result<(), SessionError> {
        self.send(&ClientMessage::IndicatorUpdate(IndicatorUpdateMessage {
            document_id: document_id.to_string(),
            indicator,
        }))
    }

    pub fn send_task_created(&self, task: Task) -> Result<(), SessionError> {
        self.send(&ClientMessage::TaskCreated(TaskMessage { task }))
    }

    pub fn send_task_updated(&self, task: Task) -> Result<(), SessionError> {
        self.send(&ClientMessage::TaskUpdated(TaskMessage { task }))
    }

    pub fn send_task_deleted(&self, task: Task) -> Result<(), SessionError> {
        self.send(&ClientMessage::TaskDeleted(TaskMessage { task }))
    }

    pub fn ping(&self) -> Result<(), SessionError> {
        self.send(&ClientMessage::Ping)
    }

    #[cfg(test)]
    pub(crate) fn emit_for_test(&self, event: SessionEvent) {
        self.inner.dispatch(event);
    }
}

async fn next_server_message<S>(stream: &mut S) -> Result<ServerMessage, SessionError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame.map_err(|e| SessionError::Transport(e.to_string()))? {
            Message::Text(text) => return Ok(serde_json::from_str(text.as_str())?),
            Message::Close(_) => break,
            _ => continue,
        }
    }
    Err(SessionError::Handshake("connection closed before welcome".to_string()))
}
