//! Block-level reparsing.
//!
//! An edit that stays inside a single top-level block only needs that block
//! to be lexed and parsed again. The new block is spliced into the previous
//! tree with [`syntax::SyntaxNode::replace_with`], so every other block keeps its
//! green node and can be recognised as unchanged by pointer.

use std::sync::Arc;

use files::TextEdit;
use rowan::{NodeOrToken, TextRange, TextSize};

use crate::{FullParsedDocument, ParseError, ParsedDocument, parse_text, sort_errors};

/// Reparses `text`, which is `edit` applied to the text of `previous`.
pub fn reparse(previous: &FullParsedDocument, edit: &TextEdit, text: &str) -> FullParsedDocument {
    if let Some(reparsed) = try_reparse(previous, edit, text) {
        tracing::trace!(target: "parsing", range = ?edit.range, "reparsed block");
        return reparsed;
    }
    tracing::trace!(target: "parsing", range = ?edit.range, "full reparse");
    parse_text(text)
}

/// Attempts to reparse only the block containing `edit`.
///
/// Returns [`None`] whenever the result could differ from a full parse.
pub fn try_reparse(
    (parsed, errors): &FullParsedDocument,
    edit: &TextEdit,
    text: &str,
) -> Option<FullParsedDocument> {
    let root = parsed.syntax_node();
    let edit_range = text_range(edit.range.start, edit.range.end)?;

    let block = root.children().find(|node| {
        let range = node.text_range();
        range.start() <= edit_range.start() && edit_range.end() <= range.end()
    })?;
    if !syntax::cst::is_block(&block) {
        return None;
    }

    let old_range = block.text_range();
    if errors.iter().any(|error| error.kind.is_unterminated() && overlaps(old_range, error.range)) {
        return None;
    }

    let start = usize::from(old_range.start());
    let old_end = usize::from(old_range.end());
    let new_end = old_end.checked_add_signed(edit.delta())?;
    if new_end <= start || new_end > text.len() {
        return None;
    }

    let before = text.get(..start)?.chars().next_back();
    let after = text.get(new_end..)?.chars().next();
    if !is_separator(before) || !is_separator(after) {
        return None;
    }

    let block_text = text.get(start..new_end)?;
    let (reparsed, block_errors) = parse_text(block_text);
    let reparsed = reparsed.syntax_node();

    let mut children = reparsed.children_with_tokens();
    let Some(NodeOrToken::Node(green)) = children.next() else {
        return None;
    };
    if children.next().is_some() || green.kind() != block.kind() {
        return None;
    }
    if block_errors.iter().any(|error| error.kind.is_unterminated()) {
        return None;
    }

    let node = block.replace_with(green.green().into_owned());
    let parsed = ParsedDocument::new(node);

    let errors = merge_errors(errors, &block_errors, old_range, edit.delta(), start)?;
    Some((parsed, errors))
}

fn merge_errors(
    errors: &[ParseError],
    block_errors: &[ParseError],
    old_range: TextRange,
    delta: isize,
    start: usize,
) -> Option<Arc<[ParseError]>> {
    let mut merged = Vec::with_capacity(errors.len() + block_errors.len());

    for error in errors {
        let range = error.range;
        let inside = old_range.start() <= range.start()
            && range.end() <= old_range.end()
            && range.start() < old_range.end();
        if inside {
            continue;
        }
        let range = if range.start() >= old_range.end() {
            let start = usize::from(range.start()).checked_add_signed(delta)?;
            let end = usize::from(range.end()).checked_add_signed(delta)?;
            text_range(start, end)?
        } else {
            range
        };
        merged.push(ParseError { range, ..error.clone() });
    }

    let offset = TextSize::try_from(start).ok()?;
    for error in block_errors {
        let range = error.range + offset;
        merged.push(ParseError { range, ..error.clone() });
    }

    Some(sort_errors(merged))
}

fn overlaps(block: TextRange, error: TextRange) -> bool {
    block.start() <= error.start() && error.start() <= block.end()
        || error.start() <= block.start() && block.start() <= error.end()
}

fn is_separator(c: Option<char>) -> bool {
    matches!(c, None | Some(' ' | '\t' | '\n' | '\r'))
}

fn text_range(start: usize, end: usize) -> Option<TextRange> {
    let start = TextSize::try_from(start).ok()?;
    let end = TextSize::try_from(end).ok()?;
    Some(TextRange::new(start, end))
}

#[cfg(test)]
mod tests {
    use files::TextEdit;

    use super::try_reparse;
    use crate::parse_text;

    fn check(before: &str, edit: TextEdit) -> bool {
        let previous = parse_text(before);
        let after = edit.apply(before);
        let full = parse_text(&after);
        match try_reparse(&previous, &edit, &after) {
            Some(reparsed) => {
                assert_eq!(reparsed.0, full.0, "tree mismatch for {after:?}");
                assert_eq!(reparsed.1, full.1, "error mismatch for {after:?}");
                true
            }
            None => false,
        }
    }

    #[test]
    fn test_reparse_inside_paragraph() {
        assert!(check("one\n\ntwo three\n\nfour", TextEdit::new(8..8, "X")));
    }

    #[test]
    fn test_reparse_keeps_sibling_nodes() {
        let before = "one\n\ntwo\n\nthree";
        let previous = parse_text(before);
        let edit = TextEdit::new(6..6, "w");
        let after = edit.apply(before);

        let (reparsed, _) = try_reparse(&previous, &edit, &after).unwrap();

        let old: Vec<_> = previous.0.syntax_node().children().collect();
        let new: Vec<_> = reparsed.syntax_node().children().collect();
        assert_eq!(old.len(), new.len());
        assert_eq!(old[0].green(), new[0].green());
        assert_ne!(old[1].green(), new[1].green());
        assert_eq!(old[2].green(), new[2].green());
    }

    #[test]
    fn test_reparse_shifts_later_errors() {
        assert!(check("one\n\ntwo\n\n} three", TextEdit::new(5..5, "XYZ")));
    }

    #[test]
    fn test_reparse_rejects_unterminated() {
        assert!(!check("one {two\n\nthree", TextEdit::new(8..8, "}")));
        assert!(!check("one two\n\nthree", TextEdit::new(4..4, "{")));
    }

    #[test]
    fn test_reparse_rejects_paragraph_break() {
        assert!(!check("one two\n\nthree", TextEdit::new(3..4, "\n\n")));
    }

    #[test]
    fn test_reparse_rejects_edit_between_blocks() {
        assert!(!check("one\n\n\ntwo", TextEdit::new(4..5, "")));
    }
}
