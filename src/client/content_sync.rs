//! Encoding local edits as change descriptors and applying remote ones.
//!
//! There is no merge: every descriptor carries the sender's full text, which
//! replaces ours. Only the caret is reconciled, from the position and size
//! of the remote edit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use chrono::Utc;
use tracing::debug;

use crate::client::surface::TextSurface;
use crate::models::{ChangeDescriptor, ChangeType};
use crate::utils::scope_guard::raise_flag;

/// Where `caret` ends up after a remote edit of `len` chars at `start`.
pub fn adjust_caret(caret: usize, change_type: ChangeType, start: usize, len: usize) -> usize {
    match change_type {
        ChangeType::Insert if start < caret => caret.saturating_add(len),
        ChangeType::Delete if start < caret => caret - len.min(caret - start),
        _ => caret,
    }
}

#[derive(Debug)]
pub struct ContentSync {
    user_id: String,
    local_caret: usize,
    local_content: String,
    applying_remote: Arc<AtomicBool>,
}

impl ContentSync {
    pub fn new(user_id: impl Into<String>, content: impl Into<String>, caret: usize) -> Self {
        let local_content = content.into();
        let local_caret = caret.min(local_content.chars().count());
        Self {
            user_id: user_id.into(),
            local_caret,
            local_content,
            applying_remote: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn content(&self) -> &str {
        &self.local_content
    }

    pub fn caret(&self) -> usize {
        self.local_caret
    }

    /// Set while a remote descriptor is being written into the surface.
    pub fn applying_remote(&self) -> bool {
        self.applying_remote.load(Ordering::SeqCst)
    }

    /// Handle on the remote-apply flag for callers that must check it
    /// without holding this value.
    pub fn remote_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.applying_remote)
    }

    /// Turn the surface's current state into a descriptor for broadcast.
    ///
    /// Returns `None` while a remote edit is being applied and when the text
    /// has not changed.
    pub fn local_edit(&mut self, surface: &dyn TextSurface) -> Option<ChangeDescriptor> {
        if self.applying_remote() {
            return None;
        }

        let content = surface.text();
        let new_len = content.chars().count();
        let caret = surface.caret_offset().min(new_len);
        if content == self.local_content {
            self.local_caret = caret;
            return None;
        }

        let old_len = self.local_content.chars().count();
        let change_type = if new_len > old_len { ChangeType::Insert } else { ChangeType::Delete };
        let change_start = self.local_caret;

        self.local_caret = caret;
        self.local_content = content.clone();

        Some(ChangeDescriptor {
            user_id: self.user_id.clone(),
            content,
            change_type,
            change_start,
            change_length: new_len.abs_diff(old_len),
            cursor_position: caret,
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    /// Track a caret move that did not change the text.
    pub fn local_selection(&mut self, surface: &dyn TextSurface) -> usize {
        self.local_caret = surface.caret_offset().min(self.local_content.chars().count());
        self.local_caret
    }

    /// Write a remote descriptor into the surface and return the caret it
    /// was restored to. Our own descriptors are ignored.
    pub fn apply_remote(&mut self, change: &ChangeDescriptor, surface: &mut dyn TextSurface) -> Option<usize> {
        if change.user_id == self.user_id {
            return None;
        }

        let flag = Arc::clone(&self.applying_remote);
        let _applying = raise_flag(&flag);

        let adjusted = adjust_caret(self.local_caret, change.change_type, change.change_start, change.change_length);
        surface.set_text(&change.content);
        self.local_content = change.content.clone();

        let caret = adjusted.min(change.content.chars().count());
        surface.set_caret_offset(caret);
        self.local_caret = caret;
        debug!(
            "Applied {:?} from {} at {} (len {}), caret -> {}",
            change.change_type, change.user_id, change.change_start, change.change_length, caret
        );
        Some(caret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::surface::TextBuffer;

    fn remote(change_type: ChangeType, start: usize, len: usize, content: &str) -> ChangeDescriptor {
        ChangeDescriptor {
            user_id: "remote".to_string(),
            content: content.to_string(),
            change_type,
            change_start: start,
            change_length: len,
            cursor_position: start,
            timestamp: 0,
        }
    }

    #[test]
    fn test_adjust_caret() {
        assert_eq!(adjust_caret(5, ChangeType::Insert, 0, 3), 8);
        assert_eq!(adjust_caret(5, ChangeType::Insert, 5, 3), 5);
        assert_eq!(adjust_caret(5, ChangeType::Delete, 2, 10), 2);
        assert_eq!(adjust_caret(5, ChangeType::Delete, 3, 1), 4);
        assert_eq!(adjust_caret(5, ChangeType::Delete, 7, 2), 5);
        // Pure: same inputs, same answer
        assert_eq!(adjust_caret(9, ChangeType::Delete, 4, 2), adjust_caret(9, ChangeType::Delete, 4, 2));
    }

    #[test]
    fn test_oversized_remote_length_clamps() {
        let mut surface = TextBuffer::new("hello");
        let mut sync = ContentSync::new("me", "hello", 5);

        let caret = sync.apply_remote(&remote(ChangeType::Insert, 0, usize::MAX, "xhello"), &mut surface);
        assert_eq!(caret, Some(6));
        assert_eq!(adjust_caret(5, ChangeType::Delete, 0, usize::MAX), 0);
    }

    #[test]
    fn test_remote_insert_before_caret() {
        let mut surface = TextBuffer::new("hello");
        let mut sync = ContentSync::new("me", "hello", 5);

        let caret = sync.apply_remote(&remote(ChangeType::Insert, 0, 3, "xyzhello"), &mut surface);
        assert_eq!(caret, Some(8));
        assert_eq!(surface.text(), "xyzhello");
        assert_eq!(surface.caret_offset(), 8);
        assert_eq!(sync.content(), "xyzhello");
    }

    #[test]
    fn test_remote_delete_clamps_to_content() {
        let mut surface = TextBuffer::new("hello world");
        surface.set_caret_offset(5);
        let mut sync = ContentSync::new("me", "hello world", 5);

        let caret = sync.apply_remote(&remote(ChangeType::Delete, 2, 10, ""), &mut surface);
        assert_eq!(caret, Some(0));
        assert_eq!(surface.text(), "");
        assert_eq!(sync.caret(), 0);
    }

    #[test]
    fn test_own_descriptor_not_applied() {
        let mut surface = TextBuffer::new("abc");
        let mut sync = ContentSync::new("me", "abc", 3);
        let mut own = remote(ChangeType::Insert, 0, 1, "zabc");
        own.user_id = "me".to_string();
        assert_eq!(sync.apply_remote(&own, &mut surface), None);
        assert_eq!(surface.text(), "abc");
    }

    #[test]
    fn test_local_insert_descriptor() {
        let mut surface = TextBuffer::new("");
        let mut sync = ContentSync::new("me", "", 0);

        surface.insert("xyz");
        let change = sync.local_edit(&surface).unwrap();
        assert_eq!(change.user_id, "me");
        assert_eq!(change.content, "xyz");
        assert_eq!(change.change_type, ChangeType::Insert);
        assert_eq!(change.change_start, 0);
        assert_eq!(change.change_length, 3);
        assert_eq!(change.cursor_position, 3);
    }

    #[test]
    fn test_local_delete_descriptor() {
        let mut surface = TextBuffer::new("hello");
        let mut sync = ContentSync::new("me", "hello", 5);

        surface.delete_backward(2);
        let change = sync.local_edit(&surface).unwrap();
        assert_eq!(change.change_type, ChangeType::Delete);
        assert_eq!(change.change_start, 5);
        assert_eq!(change.change_length, 2);
        assert_eq!(change.cursor_position, 3);
    }

    #[test]
    fn test_unchanged_text_only_moves_caret() {
        let mut surface = TextBuffer::new("hello");
        let mut sync = ContentSync::new("me", "hello", 5);
        surface.set_caret_offset(1);
        assert!(sync.local_edit(&surface).is_none());
        assert_eq!(sync.caret(), 1);
    }

    #[test]
    fn test_same_length_replacement_still_sent() {
        let mut surface = TextBuffer::new("cat");
        let mut sync = ContentSync::new("me", "cat", 3);
        surface.set_text("car");
        let change = sync.local_edit(&surface).unwrap();
        assert_eq!(change.change_type, ChangeType::Delete);
        assert_eq!(change.change_length, 0);
        assert_eq!(change.content, "car");
    }

    /// Surface that reports every write back as user input, the way an
    /// editor widget raises `input` events for programmatic changes.
    struct EchoingSurface {
        inner: TextBuffer,
        flag: Arc<AtomicBool>,
        flag_seen_during_write: Option<bool>,
    }

    impl TextSurface for EchoingSurface {
        fn text(&self) -> String {
            self.inner.text()
        }
        fn set_text(&mut self, text: &str) {
            self.flag_seen_during_write = Some(self.flag.load(Ordering::SeqCst));
            self.inner.set_text(text);
        }
        fn caret_offset(&self) -> usize {
            self.inner.caret_offset()
        }
        fn set_caret_offset(&mut self, offset: usize) {
            self.inner.set_caret_offset(offset);
        }
    }

    #[test]
    fn test_remote_apply_is_not_rebroadcast() {
        let mut sync = ContentSync::new("me", "hello", 5);
        let mut surface = EchoingSurface {
            inner: TextBuffer::new("hello"),
            flag: sync.remote_flag(),
            flag_seen_during_write: None,
        };

        sync.apply_remote(&remote(ChangeType::Insert, 0, 3, "xyzhello"), &mut surface);
        assert_eq!(surface.flag_seen_during_write, Some(true));
        assert!(!sync.applying_remote());
        // The surface now matches the local copy, so nothing goes out
        assert!(sync.local_edit(&surface).is_none());

        // And nothing goes out while the flag is up, whatever the surface says
        sync.remote_flag().store(true, Ordering::SeqCst);
        surface.inner.insert("!");
        assert!(sync.local_edit(&surface).is_none());
    }
}
