pub mod cst;

mod token_set;
pub use token_set::TokenSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(non_camel_case_types)]
#[repr(u16)]
pub enum SyntaxKind {
    WHITESPACE,
    NEWLINE,
    /// A line end followed by at least one blank line.
    BREAK,
    COMMENT,
    WORD,
    COMMAND,
    BEGIN,
    END,
    DEF,
    /// A backslash followed by a single non-letter, e.g. `\{` or `\%`.
    ESCAPE,
    /// `\\`
    LINE_BREAK,
    LEFT_CURLY,
    RIGHT_CURLY,
    LEFT_SQUARE,
    RIGHT_SQUARE,
    DOLLAR,
    DOUBLE_DOLLAR,
    PARAMETER,
    AMPERSAND,
    EQUALS,
    COMMA,
    END_OF_FILE,
    ERROR,

    Node,

    Document,
    Paragraph,
    DisplayMath,
    Environment,
    Begin,
    Body,
    End,

    Group,
    InlineMath,
    Command,
    Definition,
    Argument,
    OptionList,
    OptionItem,
    OptionValue,
}

impl SyntaxKind {
    pub fn is_trivia(self) -> bool {
        matches!(self, SyntaxKind::WHITESPACE | SyntaxKind::NEWLINE | SyntaxKind::COMMENT)
    }

    /// Kinds that can appear as top-level blocks of a document or body.
    pub fn is_block(self) -> bool {
        matches!(self, SyntaxKind::Paragraph | SyntaxKind::DisplayMath | SyntaxKind::Environment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Folio {}

impl rowan::Language for Folio {
    type Kind = SyntaxKind;

    fn kind_from_raw(raw: rowan::SyntaxKind) -> SyntaxKind {
        assert!(raw.0 <= SyntaxKind::OptionValue as u16);
        // SAFETY: SyntaxKind is repr(u16) and the range is checked above.
        unsafe { std::mem::transmute::<u16, SyntaxKind>(raw.0) }
    }

    fn kind_to_raw(kind: SyntaxKind) -> rowan::SyntaxKind {
        rowan::SyntaxKind(kind as u16)
    }
}

impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> rowan::SyntaxKind {
        rowan::SyntaxKind(kind as u16)
    }
}

pub type SyntaxNode = rowan::SyntaxNode<Folio>;
pub type SyntaxNodeChildren = rowan::SyntaxNodeChildren<Folio>;
pub type SyntaxToken = rowan::SyntaxToken<Folio>;
pub type SyntaxElement = rowan::SyntaxElement<Folio>;
pub type SyntaxNodePtr = rowan::ast::SyntaxNodePtr<Folio>;

#[cfg(test)]
mod tests {
    use rowan::{ast::AstNode, GreenNodeBuilder};

    use crate::{SyntaxKind, SyntaxNode, cst};

    #[test]
    fn test_replace_with_shares_siblings() {
        let mut builder = GreenNodeBuilder::new();
        builder.start_node(SyntaxKind::Document.into());
        builder.start_node(SyntaxKind::Paragraph.into());
        builder.token(SyntaxKind::WORD.into(), "first");
        builder.finish_node();
        builder.token(SyntaxKind::BREAK.into(), "\n\n");
        builder.start_node(SyntaxKind::Paragraph.into());
        builder.token(SyntaxKind::WORD.into(), "second");
        builder.finish_node();
        builder.finish_node();

        let root = SyntaxNode::new_root(builder.finish());
        let document = cst::Document::cast(root.clone()).unwrap();
        let second = document.blocks().nth(1).unwrap();

        let mut builder = GreenNodeBuilder::new();
        builder.start_node(SyntaxKind::Paragraph.into());
        builder.token(SyntaxKind::WORD.into(), "changed");
        builder.finish_node();

        let replaced = SyntaxNode::new_root(second.syntax().replace_with(builder.finish()));
        assert_eq!(replaced.to_string(), "first\n\nchanged");

        let before = root.first_child().unwrap();
        let after = replaced.first_child().unwrap();
        assert_eq!(before.green(), after.green());
    }
}
