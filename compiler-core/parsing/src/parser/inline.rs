use syntax::SyntaxKind;

use super::{BLOCK_END, Parser, blocks, commands};
use crate::ParseErrorKind;

/// Parses a single inline element, returning `false` if it was left
/// unterminated and an error has already been reported for it.
pub(super) fn inline(p: &mut Parser) -> bool {
    match p.current() {
        SyntaxKind::LEFT_CURLY => group(p, SyntaxKind::Group),
        SyntaxKind::DOLLAR => blocks::inline_math(p),
        SyntaxKind::COMMAND => commands::command(p),
        SyntaxKind::DEF => commands::definition(p),
        SyntaxKind::RIGHT_CURLY => {
            p.error_recover(ParseErrorKind::UnmatchedClose, "Unmatched '}'");
            true
        }
        _ => {
            p.consume();
            true
        }
    }
}

/// Parses `{ ... }` as either a [`SyntaxKind::Group`] or an [`SyntaxKind::Argument`].
///
/// Only the innermost unterminated group is reported.
pub(super) fn group(p: &mut Parser, kind: SyntaxKind) -> bool {
    let mut m = p.start();
    p.consume();

    let mut nested = true;
    loop {
        if p.eat(SyntaxKind::RIGHT_CURLY) {
            m.end(p, kind);
            return true;
        }
        if p.at_in(BLOCK_END) {
            break;
        }
        nested &= inline(p);
    }

    if nested {
        p.error_node(&m, ParseErrorKind::UnterminatedGroup, "Unterminated group");
    }
    m.end(p, kind);
    false
}
