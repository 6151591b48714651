use syntax::{SyntaxKind, TokenSet};

use super::{BLOCK_END, Parser, commands, inline};
use crate::ParseErrorKind;

/// Tokens that end math content regardless of its delimiter.
const MATH_END: TokenSet = TokenSet::new(&[
    SyntaxKind::BREAK,
    SyntaxKind::BEGIN,
    SyntaxKind::END,
    SyntaxKind::END_OF_FILE,
]);

pub(super) fn blocks(p: &mut Parser, in_environment: bool) {
    while !p.at_eof() {
        match p.current() {
            SyntaxKind::WHITESPACE
            | SyntaxKind::NEWLINE
            | SyntaxKind::BREAK
            | SyntaxKind::COMMENT => p.consume(),
            SyntaxKind::END if in_environment => break,
            SyntaxKind::END => unmatched_end(p),
            SyntaxKind::BEGIN => environment(p),
            SyntaxKind::DOUBLE_DOLLAR => display_math(p),
            _ => paragraph(p),
        }
    }
}

fn paragraph(p: &mut Parser) {
    let mut m = p.start();
    while !BLOCK_END.contains(p.current_non_trivia()) {
        inline::inline(p);
    }
    m.end(p, SyntaxKind::Paragraph);
}

fn display_math(p: &mut Parser) {
    let mut m = p.start();
    p.consume();

    let mut nested = true;
    loop {
        if p.eat(SyntaxKind::DOUBLE_DOLLAR) {
            m.end(p, SyntaxKind::DisplayMath);
            return;
        }
        if p.at_in(MATH_END) {
            break;
        }
        match p.current() {
            SyntaxKind::LEFT_CURLY => nested &= math_group(p, SyntaxKind::DOUBLE_DOLLAR),
            SyntaxKind::RIGHT_CURLY => {
                p.error_recover(ParseErrorKind::UnmatchedClose, "Unmatched '}' in math")
            }
            _ => p.consume(),
        }
    }

    if nested {
        p.error_node(&m, ParseErrorKind::UnterminatedMath, "Unterminated display math");
    }
    m.end(p, SyntaxKind::DisplayMath);
}

pub(super) fn inline_math(p: &mut Parser) -> bool {
    let mut m = p.start();
    p.consume();

    let mut nested = true;
    loop {
        if p.eat(SyntaxKind::DOLLAR) {
            m.end(p, SyntaxKind::InlineMath);
            return true;
        }
        if p.at_in(BLOCK_END) {
            break;
        }
        match p.current() {
            SyntaxKind::LEFT_CURLY => nested &= math_group(p, SyntaxKind::DOLLAR),
            SyntaxKind::RIGHT_CURLY => {
                p.error_recover(ParseErrorKind::UnmatchedClose, "Unmatched '}' in math")
            }
            _ => p.consume(),
        }
    }

    if nested {
        p.error_node(&m, ParseErrorKind::UnterminatedMath, "Unterminated inline math");
    }
    m.end(p, SyntaxKind::InlineMath);
    false
}

/// Braces inside math only group; their contents stay raw tokens.
fn math_group(p: &mut Parser, closer: SyntaxKind) -> bool {
    let mut m = p.start();
    p.consume();

    let mut nested = true;
    loop {
        if p.eat(SyntaxKind::RIGHT_CURLY) {
            m.end(p, SyntaxKind::Group);
            return true;
        }
        if p.at(closer) || p.at_in(MATH_END) || p.at(SyntaxKind::DOUBLE_DOLLAR) {
            break;
        }
        if p.at(SyntaxKind::LEFT_CURLY) {
            nested &= math_group(p, closer);
        } else {
            p.consume();
        }
    }

    if nested {
        p.error_node(&m, ParseErrorKind::UnterminatedGroup, "Unterminated group");
    }
    m.end(p, SyntaxKind::Group);
    false
}

fn environment(p: &mut Parser) {
    let mut m = p.start();

    let mut begin = p.start();
    p.consume();
    let mut terminated = true;
    if p.at(SyntaxKind::LEFT_CURLY) {
        terminated &= inline::group(p, SyntaxKind::Argument);
    } else {
        p.error_node(&begin, ParseErrorKind::MissingName, "Expected an environment name");
    }
    if p.at(SyntaxKind::LEFT_SQUARE) {
        terminated &= commands::option_list(p);
    }
    begin.end(p, SyntaxKind::Begin);

    let mut body = p.start();
    blocks(p, true);
    body.end(p, SyntaxKind::Body);

    if p.at(SyntaxKind::END) {
        let mut end = p.start();
        p.consume();
        if p.at(SyntaxKind::LEFT_CURLY) {
            inline::group(p, SyntaxKind::Argument);
        } else {
            p.error_node(&end, ParseErrorKind::MissingName, "Expected an environment name");
        }
        end.end(p, SyntaxKind::End);
    } else if terminated {
        p.error_node(&begin, ParseErrorKind::UnterminatedEnvironment, "Unterminated environment");
    }

    m.end(p, SyntaxKind::Environment);
}

fn unmatched_end(p: &mut Parser) {
    let mut m = p.start();
    p.error(ParseErrorKind::UnmatchedEnd, "Unmatched \\end");
    p.consume();
    if p.at(SyntaxKind::LEFT_CURLY) {
        inline::group(p, SyntaxKind::Argument);
    }
    m.end(p, SyntaxKind::ERROR);
}
