//! Collaboration client: one session per process, one view per open document.

pub mod content_sync;
pub mod document_view;
pub mod presence;
pub mod session;
pub mod surface;
pub mod timers;

pub use content_sync::{adjust_caret, ContentSync};
pub use document_view::{DocumentView, ViewSnapshot};
pub use presence::{PresenceConfig, PresenceEmitter, PresenceTracker, DISPLAY_COLORS};
pub use session::{ConnectionSession, SessionConfig, SessionError, SessionEvent, SessionState};
pub use surface::{TextBuffer, TextSurface};
pub use timers::{IdleTimer, Throttle};
