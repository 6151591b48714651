//! Typed wrappers over the concrete syntax tree.

#[macro_use]
mod macros;

use rowan::ast::AstNode;

create_cst_struct!(
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
);

create_cst_enum!(Block | Paragraph | DisplayMath | Environment);

has_children!(
    Document
    | blocks() -> Block
);

has_children!(
    Body
    | blocks() -> Block
);

has_child!(
    Environment
    | begin() -> Begin
    | body() -> Body
    | end() -> End
);

has_token!(
    Begin
    | begin_token() -> BEGIN
);

has_child!(
    Begin
    | name() -> Argument
    | options() -> OptionList
);

has_token!(
    End
    | end_token() -> END
);

has_child!(
    End
    | name() -> Argument
);

has_token!(
    Command
    | name_token() -> COMMAND
);

has_child!(
    Command
    | options() -> OptionList
);

has_children!(
    Command
    | arguments() -> Argument
);

has_token!(
    Definition
    | def_token() -> DEF
);

has_child!(
    Definition
    | options() -> OptionList
);

has_children!(
    Definition
    | arguments() -> Argument
);

has_children!(
    OptionList
    | items() -> OptionItem
);

has_token!(
    OptionItem
    | key() -> WORD
    | equals() -> EQUALS
);

has_child!(
    OptionItem
    | value() -> OptionValue
);

has_contents!(
    Group => LEFT_CURLY | RIGHT_CURLY;
    Argument => LEFT_CURLY | RIGHT_CURLY;
    InlineMath => DOLLAR;
    DisplayMath => DOUBLE_DOLLAR;
    OptionValue => WHITESPACE;
);

impl Paragraph {
    pub fn elements(&self) -> impl Iterator<Item = crate::SyntaxElement> {
        self.syntax().children_with_tokens()
    }
}

impl Command {
    /// The command name without its leading backslash.
    pub fn name(&self) -> Option<smol_str::SmolStr> {
        let token = self.name_token()?;
        Some(token.text().trim_start_matches('\\').into())
    }
}

impl Definition {
    pub fn name(&self) -> Option<Argument> {
        self.arguments().next()
    }

    pub fn body(&self) -> Option<Argument> {
        self.arguments().nth(1)
    }
}

impl InlineMath {
    pub fn is_terminated(&self) -> bool {
        let delimiters = self.syntax().children_with_tokens().filter(|element| {
            element.kind() == crate::SyntaxKind::DOLLAR
        });
        delimiters.count() == 2
    }
}

impl Argument {
    /// Concatenated text of the argument without braces and surrounding whitespace.
    pub fn plain_text(&self) -> String {
        let mut buffer = String::new();
        for element in self.contents() {
            match element {
                rowan::NodeOrToken::Node(node) => buffer.push_str(&node.to_string()),
                rowan::NodeOrToken::Token(token) => buffer.push_str(token.text()),
            }
        }
        buffer.trim().to_string()
    }
}

impl OptionValue {
    pub fn plain_text(&self) -> String {
        self.syntax().to_string().trim().to_string()
    }
}

pub fn is_block(node: &crate::SyntaxNode) -> bool {
    Block::can_cast(node.kind())
}
