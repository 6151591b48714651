use files::FileId;
use rustc_hash::FxHashSet;

use crate::{Diagnostic, Span};

/// Merges the diagnostics of one compilation.
///
/// Identical `(file, span, message)` triples are reported once; the result
/// is ordered by file, then by span.
#[derive(Debug, Default)]
pub struct Collector {
    pub version: u32,
    diagnostics: Vec<Diagnostic>,
    seen: FxHashSet<(FileId, Span, String)>,
}

impl Collector {
    pub fn new(version: u32) -> Collector {
        Collector { version, ..Collector::default() }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        let key = (diagnostic.file, diagnostic.span, diagnostic.message.clone());
        if self.seen.insert(key) {
            self.diagnostics.push(diagnostic);
        }
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn finish(self) -> Vec<Diagnostic> {
        let mut diagnostics = self.diagnostics;
        diagnostics.sort_by_key(|diagnostic| (diagnostic.file, diagnostic.span.start, diagnostic.span.end));
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use files::SourceStore;

    use crate::{Collector, Diagnostic, DiagnosticKind, Span};

    #[test]
    fn test_dedup_and_order() {
        let mut store = SourceStore::default();
        let a = store.insert("a.fol", "");
        let b = store.insert("b.fol", "");

        let error = |file, start, end, message: &str| {
            Diagnostic::error(DiagnosticKind::Binding, "NotInScope", message, file, Span::new(start, end))
        };

        let mut collector = Collector::new(3);
        collector.push(error(b, 0, 2, "first"));
        collector.push(error(a, 8, 9, "second"));
        collector.push(error(a, 2, 4, "third"));
        collector.push(error(a, 8, 9, "second"));
        collector.push(error(a, 8, 9, "other"));
        assert_eq!(collector.len(), 4);

        let messages: Vec<_> =
            collector.finish().into_iter().map(|diagnostic| diagnostic.message).collect();
        assert_eq!(messages, ["third", "second", "other", "first"]);
    }
}
