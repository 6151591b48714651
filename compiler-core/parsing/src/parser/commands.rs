use syntax::{SyntaxKind, TokenSet};

use super::{BLOCK_END, Parser, inline};
use crate::ParseErrorKind;

const OPTION_LIST_END: TokenSet =
    TokenSet::new(&[SyntaxKind::LEFT_CURLY, SyntaxKind::RIGHT_CURLY]).union(BLOCK_END);

const OPTION_VALUE_END: TokenSet =
    TokenSet::new(&[SyntaxKind::COMMA, SyntaxKind::RIGHT_SQUARE, SyntaxKind::RIGHT_CURLY])
        .union(BLOCK_END);

/// `\name[options]{argument}...`, where options and arguments must be adjacent.
pub(super) fn command(p: &mut Parser) -> bool {
    let mut m = p.start();
    p.consume();

    let mut terminated = true;
    if p.at(SyntaxKind::LEFT_SQUARE) {
        terminated &= option_list(p);
    }
    while terminated && p.at(SyntaxKind::LEFT_CURLY) {
        terminated &= inline::group(p, SyntaxKind::Argument);
    }

    m.end(p, SyntaxKind::Command);
    terminated
}

/// `\def{name}[arity]{body}`
pub(super) fn definition(p: &mut Parser) -> bool {
    let mut m = p.start();
    p.consume();

    if !p.at(SyntaxKind::LEFT_CURLY) {
        p.error_node(&m, ParseErrorKind::MissingName, "Expected a name after \\def");
        m.end(p, SyntaxKind::Definition);
        return true;
    }

    let mut terminated = inline::group(p, SyntaxKind::Argument);
    if terminated && p.at(SyntaxKind::LEFT_SQUARE) {
        terminated &= option_list(p);
    }
    if terminated {
        if p.at(SyntaxKind::LEFT_CURLY) {
            terminated &= inline::group(p, SyntaxKind::Argument);
        } else {
            p.error_node(&m, ParseErrorKind::MissingBody, "Expected a body for \\def");
        }
    }

    m.end(p, SyntaxKind::Definition);
    terminated
}

pub(super) fn option_list(p: &mut Parser) -> bool {
    let mut m = p.start();
    p.consume();

    loop {
        p.eat_trivia();
        if p.eat(SyntaxKind::RIGHT_SQUARE) {
            m.end(p, SyntaxKind::OptionList);
            return true;
        }
        if p.at_in(OPTION_LIST_END) {
            break;
        }
        match p.current() {
            SyntaxKind::WORD => option_item(p),
            SyntaxKind::COMMA => p.consume(),
            _ => p.error_recover(ParseErrorKind::InvalidOption, "Expected an option name"),
        }
    }

    p.error_node(&m, ParseErrorKind::UnterminatedOptions, "Unterminated option list");
    m.end(p, SyntaxKind::OptionList);
    false
}

fn option_item(p: &mut Parser) {
    let mut m = p.start();
    p.consume();
    p.eat(SyntaxKind::WHITESPACE);
    if p.eat(SyntaxKind::EQUALS) {
        option_value(p);
    }
    m.end(p, SyntaxKind::OptionItem);
}

fn option_value(p: &mut Parser) {
    let mut m = p.start();
    while !p.at_in(OPTION_VALUE_END) {
        if p.at(SyntaxKind::LEFT_CURLY) {
            inline::group(p, SyntaxKind::Group);
        } else {
            p.consume();
        }
    }
    m.end(p, SyntaxKind::OptionValue);
}
