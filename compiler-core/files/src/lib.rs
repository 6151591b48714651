//! The source store for documents being compiled.
//!
//! Every document is identified by a [`FileId`] and holds a short history of
//! immutable [`SourceVersion`] snapshots. Edits never mutate a snapshot in
//! place; [`SourceStore::apply_edit`] produces the next version and records
//! the [`TextEdit`] that led to it, which the parser uses for incremental
//! reparsing.

mod edit;

pub use edit::TextEdit;

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;

use indexmap::IndexMap;
use la_arena::{Arena, Idx};
use rustc_hash::FxBuildHasher;
use thiserror::Error;

pub type FileId = Idx<File>;

/// Number of past versions retained per document.
const HISTORY: usize = 16;

/// An immutable snapshot of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVersion {
    pub file: FileId,
    pub version: u32,
    pub text: Arc<str>,
    /// The edit that produced this version from the previous one.
    pub edit: Option<TextEdit>,
}

#[derive(Debug)]
pub struct File {
    path: Arc<str>,
    history: VecDeque<SourceVersion>,
}

impl File {
    fn latest(&self) -> &SourceVersion {
        self.history.back().expect("invariant violated: empty history")
    }

    fn push(&mut self, version: SourceVersion) {
        if self.history.len() == HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(version);
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("Edit range {range:?} is outside of a {length} byte document")]
    OutOfBounds { range: Range<usize>, length: usize },
    #[error("Edit offset {offset} is not on a character boundary")]
    NotCharBoundary { offset: usize },
}

#[derive(Debug, Default)]
pub struct SourceStore {
    files: Arena<File>,
    paths: IndexMap<Arc<str>, FileId, FxBuildHasher>,
}

impl SourceStore {
    /// Sets the full contents of a document, allocating it if needed.
    ///
    /// Replacing the contents of an existing document records the edit
    /// recovered from the difference between the old and the new text.
    pub fn insert(&mut self, path: impl AsRef<str>, text: impl Into<Arc<str>>) -> FileId {
        let path = path.as_ref();
        let text = text.into();

        if let Some(&file) = self.paths.get(path) {
            let latest = self.files[file].latest();
            if latest.text == text {
                return file;
            }
            let edit = Some(TextEdit::diff(&latest.text, &text));
            let version = latest.version + 1;
            self.files[file].push(SourceVersion { file, version, text, edit });
            return file;
        }

        let path: Arc<str> = path.into();
        let history = VecDeque::with_capacity(HISTORY);
        let file = self.files.alloc(File { path: Arc::clone(&path), history });
        self.files[file].push(SourceVersion { file, version: 0, text, edit: None });
        self.paths.insert(path, file);

        file
    }

    /// Replaces `range` in the latest version of `file` with `text`.
    pub fn apply_edit(
        &mut self,
        file: FileId,
        range: Range<usize>,
        text: &str,
    ) -> Result<SourceVersion, EditError> {
        let latest = self.files[file].latest();

        let length = latest.text.len();
        if range.start > range.end || range.end > length {
            return Err(EditError::OutOfBounds { range, length });
        }
        for offset in [range.start, range.end] {
            if !latest.text.is_char_boundary(offset) {
                return Err(EditError::NotCharBoundary { offset });
            }
        }

        let edit = TextEdit::new(range, text);
        let text: Arc<str> = edit.apply(&latest.text).into();
        let version = latest.version + 1;

        tracing::debug!(target: "files", ?file, version, range = ?edit.range, "apply_edit");

        let version = SourceVersion { file, version, text, edit: Some(edit) };
        self.files[file].push(version.clone());

        Ok(version)
    }

    pub fn id(&self, path: impl AsRef<str>) -> Option<FileId> {
        self.paths.get(path.as_ref()).copied()
    }

    pub fn path(&self, file: FileId) -> Arc<str> {
        Arc::clone(&self.files[file].path)
    }

    pub fn content(&self, file: FileId) -> Arc<str> {
        Arc::clone(&self.files[file].latest().text)
    }

    pub fn latest(&self, file: FileId) -> SourceVersion {
        self.files[file].latest().clone()
    }

    /// Returns a retained version of `file`, if it is still in the history.
    pub fn version(&self, file: FileId, version: u32) -> Option<SourceVersion> {
        self.files[file].history.iter().find(|source| source.version == version).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &str)> {
        self.paths.iter().map(|(path, &file)| (file, path.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use crate::{EditError, SourceStore, TextEdit};

    #[test]
    fn test_insert_and_replace() {
        let mut store = SourceStore::default();
        let id = store.insert("main.fol", "Hello");
        assert_eq!(store.latest(id).version, 0);
        assert_eq!(store.latest(id).edit, None);

        let same = store.insert("main.fol", "Hello, World");
        assert_eq!(id, same);

        let latest = store.latest(id);
        assert_eq!(latest.version, 1);
        assert_eq!(latest.edit, Some(TextEdit::new(5..5, ", World")));
    }

    #[test]
    fn test_insert_unchanged() {
        let mut store = SourceStore::default();
        let id = store.insert("main.fol", "Hello");
        store.insert("main.fol", "Hello");
        assert_eq!(store.latest(id).version, 0);
    }

    #[test]
    fn test_apply_edit() {
        let mut store = SourceStore::default();
        let id = store.insert("main.fol", "A C");

        let version = store.apply_edit(id, 2..2, "{B} ").unwrap();
        assert_eq!(version.version, 1);
        assert_eq!(&*version.text, "A {B} C");
        assert_eq!(store.content(id).as_ref(), "A {B} C");

        let previous = store.version(id, 0).unwrap();
        assert_eq!(&*previous.text, "A C");
    }

    #[test]
    fn test_apply_edit_out_of_bounds() {
        let mut store = SourceStore::default();
        let id = store.insert("main.fol", "A C");
        let error = store.apply_edit(id, 2..10, "").unwrap_err();
        assert_eq!(error, EditError::OutOfBounds { range: 2..10, length: 3 });
    }

    #[test]
    fn test_apply_edit_char_boundary() {
        let mut store = SourceStore::default();
        let id = store.insert("main.fol", "caf\u{e9}");
        let error = store.apply_edit(id, 4..4, "x").unwrap_err();
        assert_eq!(error, EditError::NotCharBoundary { offset: 4 });
    }

    #[test]
    fn test_history_is_bounded() {
        let mut store = SourceStore::default();
        let id = store.insert("main.fol", "");
        for _ in 0..20 {
            store.apply_edit(id, 0..0, "x").unwrap();
        }
        assert_eq!(store.latest(id).version, 20);
        assert!(store.version(id, 0).is_none());
        assert!(store.version(id, 19).is_some());
    }
}
