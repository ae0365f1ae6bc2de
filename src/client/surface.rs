/// The editable text a document view reads from and writes into.
///
/// Offsets are counted in chars.
pub trait TextSurface: Send {
    fn text(&self) -> String;
    fn set_text(&mut self, text: &str);
    fn caret_offset(&self) -> usize;
    fn set_caret_offset(&mut self, offset: usize);
}

/// In-memory surface for headless clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    caret: usize,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let caret = text.chars().count();
        Self { text, caret }
    }

    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Type `s` at the caret and move the caret past it.
    pub fn insert(&mut self, s: &str) {
        let at = self.byte_index(self.caret);
        self.text.insert_str(at, s);
        self.caret += s.chars().count();
    }

    /// Remove up to `n` chars before the caret.
    pub fn delete_backward(&mut self, n: usize) {
        let start = self.caret.saturating_sub(n);
        let (from, to) = (self.byte_index(start), self.byte_index(self.caret));
        self.text.replace_range(from..to, "");
        self.caret = start;
    }

    fn byte_index(&self, offset: usize) -> usize {
        self.text
            .char_indices()
            .nth(offset)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }
}

impl TextSurface for TextBuffer {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        self.caret = self.caret.min(self.len());
    }

    fn caret_offset(&self) -> usize {
        self.caret
    }

    fn set_caret_offset(&mut self, offset: usize) {
        self.caret = offset.min(self.len());
    }
}
