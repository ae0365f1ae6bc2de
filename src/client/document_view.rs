use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::client::content_sync::ContentSync;
use crate::client::presence::{pick_display_color, PresenceConfig, PresenceEmitter, PresenceTracker};
use crate::client::session::{ConnectionSession, SessionError, SessionEvent};
use crate::client::surface::TextSurface;
use crate::models::{document_event, ChangeDescriptor, Indicator, ServerMessage};

const DOCUMENT_EVENTS: [&str; 4] = ["content-change", "indicator-update", "user-join", "user-leave"];

struct ViewState<S> {
    sync: ContentSync,
    presence: PresenceTracker,
    surface: S,
}

/// What a renderer needs to draw one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub content: String,
    pub caret: usize,
    pub active_users: Vec<String>,
    pub indicators: Vec<Indicator>,
}

/// One open document: its surface, content sync and presence, wired to a
/// shared session.
pub struct DocumentView<S: TextSurface + 'static> {
    document_id: String,
    user_id: String,
    session: ConnectionSession,
    state: Arc<Mutex<ViewState<S>>>,
    applying_remote: Arc<AtomicBool>,
    emitter: PresenceEmitter,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: TextSurface + 'static> DocumentView<S> {
    pub fn new(
        session: ConnectionSession,
        document_id: impl Into<String>,
        user_id: impl Into<String>,
        surface: S,
        config: PresenceConfig,
    ) -> Self {
        let document_id = document_id.into();
        let user_id = user_id.into();

        let sync = ContentSync::new(user_id.clone(), surface.text(), surface.caret_offset());
        let applying_remote = sync.remote_flag();
        let presence = PresenceTracker::new(user_id.clone(), pick_display_color());

        let emitter = {
            let session = session.clone();
            let document_id = document_id.clone();
            PresenceEmitter::new(config, move |indicator| {
                if let Err(e) = session.send_indicator(&document_id, indicator) {
                    debug!("Dropping indicator for {}: {}", document_id, e);
                }
            })
        };

        Self {
            document_id,
            user_id,
            session,
            state: Arc::new(Mutex::new(ViewState { sync, presence, surface })),
            applying_remote,
            emitter,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Subscribe to this document's events and join its channel.
    pub fn attach(&self) -> Result<(), SessionError> {
        let state = Arc::clone(&self.state);
        self.session.on(self.event("content-change"), move |event| {
            if let SessionEvent::Server(ServerMessage::ContentChange(msg)) = event {
                let mut state = lock(&state);
                let ViewState { sync, surface, .. } = &mut *state;
                sync.apply_remote(&msg.change, surface);
            }
        });

        let state = Arc::clone(&self.state);
        self.session.on(self.event("indicator-update"), move |event| {
            if let SessionEvent::Server(ServerMessage::IndicatorUpdate(msg)) = event {
                lock(&state).presence.apply_incoming(msg.indicator);
            }
        });

        let state = Arc::clone(&self.state);
        self.session.on(self.event("user-join"), move |event| {
            if let SessionEvent::Server(ServerMessage::UserJoin(msg)) = event {
                lock(&state).presence.record_join(&msg.user_id);
            }
        });

        let state = Arc::clone(&self.state);
        self.session.on(self.event("user-leave"), move |event| {
            if let SessionEvent::Server(ServerMessage::UserLeave(msg)) = event {
                lock(&state).presence.record_leave(&msg.user_id);
            }
        });

        lock(&self.state).presence.record_join(&self.user_id);
        self.session.join_document(&self.document_id, &self.user_id)
    }

    /// Unsubscribe, cancel pending presence traffic and leave the channel.
    pub fn detach(&self) -> Result<(), SessionError> {
        for event in DOCUMENT_EVENTS {
            self.session.off(&self.event(event));
        }
        self.emitter.disarm();
        lock(&self.state).presence.record_leave(&self.user_id);
        self.session.leave_document(&self.document_id, &self.user_id)
    }

    /// Mutate the surface, e.g. to replay user typing on a headless buffer.
    /// Follow with `local_input` to broadcast the result.
    pub fn edit_surface<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut lock(&self.state).surface)
    }

    /// The surface's text changed; broadcast it.
    pub fn local_input(&self) -> Result<Option<ChangeDescriptor>, SessionError> {
        // Writes made while applying a remote edit come back here as input
        if self.applying_remote.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let (change, cursor) = {
            let mut state = lock(&self.state);
            let ViewState { sync, presence, surface } = &mut *state;
            let change = sync.local_edit(&*surface);
            (change, presence.local_cursor(sync.caret()))
        };

        if let Some(change) = &change {
            self.session.send_content_change(&self.document_id, change.clone())?;
        }
        self.emitter.cursor_moved(cursor);
        Ok(change)
    }

    /// The caret moved without a text change.
    pub fn local_selection(&self) -> usize {
        let (caret, cursor) = {
            let mut state = lock(&self.state);
            let ViewState { sync, presence, surface } = &mut *state;
            let caret = sync.local_selection(&*surface);
            (caret, presence.local_cursor(caret))
        };
        self.emitter.cursor_moved(cursor);
        caret
    }

    pub fn pointer_moved(&self, x: f64, y: f64) {
        let pointer = lock(&self.state).presence.local_pointer(x, y);
        self.emitter.pointer_moved(pointer);
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let state = lock(&self.state);
        ViewSnapshot {
            content: state.sync.content().to_string(),
            caret: state.sync.caret(),
            active_users: state.presence.active_users(),
            indicators: state.presence.indicators(),
        }
    }

    fn event(&self, name: &str) -> String {
        document_event(&self.document_id, name)
    }
}

impl<S: TextSurface + 'static> Drop for DocumentView<S> {
    fn drop(&mut self) {
        self.emitter.dispose();
        for event in DOCUMENT_EVENTS {
            self.session.off(&self.event(event));
        }
        if self.session.joined_documents().contains(&self.document_id) {
            if let Err(e) = self.session.leave_document(&self.document_id, &self.user_id) {
                warn!("Failed to leave document {} on drop: {}", self.document_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::session::SessionConfig;
    use crate::client::surface::TextBuffer;
    use crate::models::{ChangeType, ContentChangeMessage, IndicatorUpdateMessage, MembershipMessage};

    fn offline_view(text: &str) -> (ConnectionSession, DocumentView<TextBuffer>) {
        let session = ConnectionSession::new(SessionConfig::new("ws://127.0.0.1:9/ws", "t"));
        let view = DocumentView::new(session.clone(), "doc1", "me", TextBuffer::new(text), PresenceConfig::default());
        (session, view)
    }

    /// Handlers are installed even when the join itself cannot be sent.
    fn attach_offline(view: &DocumentView<TextBuffer>) {
        assert!(matches!(view.attach(), Err(SessionError::NotConnected)));
    }

    fn deliver(session: &ConnectionSession, msg: ServerMessage) {
        let name = msg.event_name();
        assert!(session.has_handler(&name), "no handler for {}", name);
        session.emit_for_test(SessionEvent::Server(msg));
    }

    #[tokio::test]
    async fn test_remote_change_updates_surface_and_caret() {
        let (session, view) = offline_view("hello");
        attach_offline(&view);

        deliver(&session, ServerMessage::ContentChange(ContentChangeMessage {
            document_id: "doc1".to_string(),
            change: ChangeDescriptor {
                user_id: "bob".to_string(),
                content: "xyzhello".to_string(),
                change_type: ChangeType::Insert,
                change_start: 0,
                change_length: 3,
                cursor_position: 3,
                timestamp: 0,
            },
        }));

        let snapshot = view.snapshot();
        assert_eq!(snapshot.content, "xyzhello");
        assert_eq!(snapshot.caret, 8);
        assert_eq!(view.edit_surface(|s| s.caret_offset()), 8);
    }

    #[tokio::test]
    async fn test_presence_follows_membership_events() {
        let (session, view) = offline_view("");
        attach_offline(&view);

        deliver(&session, ServerMessage::UserJoin(MembershipMessage {
            document_id: "doc1".to_string(),
            user_id: "bob".to_string(),
        }));
        deliver(&session, ServerMessage::IndicatorUpdate(IndicatorUpdateMessage {
            document_id: "doc1".to_string(),
            indicator: Indicator::cursor("bob", "#33FF57", 0),
        }));
        assert_eq!(view.snapshot().active_users, vec!["bob", "me"]);
        assert_eq!(view.snapshot().indicators.len(), 1);

        deliver(&session, ServerMessage::UserLeave(MembershipMessage {
            document_id: "doc1".to_string(),
            user_id: "bob".to_string(),
        }));
        let snapshot = view.snapshot();
        assert_eq!(snapshot.active_users, vec!["me"]);
        assert!(snapshot.indicators.is_empty());
    }

    #[tokio::test]
    async fn test_detach_removes_handlers() {
        let (session, view) = offline_view("");
        attach_offline(&view);
        assert!(session.has_handler("doc1:content-change"));

        assert!(view.detach().is_err());
        for event in DOCUMENT_EVENTS {
            assert!(!session.has_handler(&document_event("doc1", event)));
        }
    }

    #[tokio::test]
    async fn test_local_input_offline_reports_not_connected() {
        let (_session, view) = offline_view("");
        view.edit_surface(|s| s.insert("a"));
        assert!(matches!(view.local_input(), Err(SessionError::NotConnected)));
        // The local copy still advanced
        assert_eq!(view.snapshot().content, "a");
    }
}
