use std::ops::Range;
use std::sync::Arc;

/// A replacement of a byte range with new text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub text: Arc<str>,
}

impl TextEdit {
    pub fn new(range: Range<usize>, text: impl Into<Arc<str>>) -> TextEdit {
        let text = text.into();
        TextEdit { range, text }
    }

    /// Recovers the smallest single edit that turns `old` into `new`.
    ///
    /// The common prefix and suffix are trimmed back to character boundaries
    /// on both sides, and never overlap.
    pub fn diff(old: &str, new: &str) -> TextEdit {
        let mut prefix = old.bytes().zip(new.bytes()).take_while(|(a, b)| a == b).count();
        while !old.is_char_boundary(prefix) || !new.is_char_boundary(prefix) {
            prefix -= 1;
        }

        let limit = old.len().min(new.len()) - prefix;
        let mut suffix = old
            .bytes()
            .rev()
            .zip(new.bytes().rev())
            .take(limit)
            .take_while(|(a, b)| a == b)
            .count();
        while !old.is_char_boundary(old.len() - suffix) || !new.is_char_boundary(new.len() - suffix)
        {
            suffix -= 1;
        }

        let range = prefix..old.len() - suffix;
        let text = &new[prefix..new.len() - suffix];
        TextEdit::new(range, text)
    }

    pub fn apply(&self, text: &str) -> String {
        let mut buffer = String::with_capacity(text.len() + self.text.len());
        buffer.push_str(&text[..self.range.start]);
        buffer.push_str(&self.text);
        buffer.push_str(&text[self.range.end..]);
        buffer
    }

    /// The range covered by the inserted text, in the edited document.
    pub fn inserted_range(&self) -> Range<usize> {
        self.range.start..self.range.start + self.text.len()
    }

    /// Shift applied to every offset after the edited range.
    pub fn delta(&self) -> isize {
        self.text.len() as isize - self.range.len() as isize
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty() && self.text.is_empty()
    }
}
