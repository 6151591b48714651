use std::ops::Range;

use syntax::SyntaxKind;

/// A sequence of tokens over a source string.
#[derive(Debug)]
pub struct Lexed<'s> {
    source: &'s str,
    kinds: Vec<SyntaxKind>,
    offsets: Vec<u32>,
    errors: Vec<LexError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LexError {
    index: u32,
    message: &'static str,
}

impl<'s> Lexed<'s> {
    pub(crate) fn new(source: &'s str) -> Lexed<'s> {
        let kinds = vec![];
        let offsets = vec![];
        let errors = vec![];
        Lexed { source, kinds, offsets, errors }
    }

    pub(crate) fn push(&mut self, kind: SyntaxKind, offset: usize, error: Option<&'static str>) {
        if let Some(message) = error {
            let index = self.kinds.len() as u32;
            self.errors.push(LexError { index, message });
        }
        self.kinds.push(kind);
        self.offsets.push(offset as u32);
    }

    /// # Invariant
    ///
    /// [`Lexed`] always ends with [`SyntaxKind::END_OF_FILE`], which only
    /// anchors the final offset so that the range of the last real token can
    /// be computed. It is never counted as a token.
    pub fn len(&self) -> usize {
        self.kinds.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn source(&self) -> &'s str {
        self.source
    }

    pub fn kinds(&self) -> &[SyntaxKind] {
        &self.kinds[..self.len()]
    }

    pub fn kind(&self, index: usize) -> SyntaxKind {
        self.kinds[index]
    }

    /// Returns the byte range for an index; the end-of-file index has an
    /// empty range.
    pub fn range(&self, index: usize) -> Range<usize> {
        let start = self.offsets[index] as usize;
        let end = self.offsets.get(index + 1).map_or(start, |&end| end as usize);
        start..end
    }

    pub fn text(&self, index: usize) -> &'s str {
        &self.source[self.range(index)]
    }

    pub fn text_in_range(&self, range: Range<usize>) -> &'s str {
        assert!(range.start <= range.end && range.end <= self.len());
        let low = self.offsets[range.start] as usize;
        let high = self.offsets[range.end] as usize;
        &self.source[low..high]
    }

    pub fn error(&self, index: usize) -> Option<&'static str> {
        let index = index as u32;
        let position = self.errors.binary_search_by_key(&index, |error| error.index).ok()?;
        Some(self.errors[position].message)
    }
}
