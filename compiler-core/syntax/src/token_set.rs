use crate::SyntaxKind;

const LAST_TOKEN: usize = SyntaxKind::ERROR as usize;

#[derive(Clone, Copy)]
pub struct TokenSet(u64);

impl TokenSet {
    pub const fn new(tokens: &[SyntaxKind]) -> TokenSet {
        let mut set = 0;
        let mut index = 0;
        while index < tokens.len() {
            let token = tokens[index] as usize;
            debug_assert!(token <= LAST_TOKEN, "Invalid token");
            set |= 1 << token;
            index += 1;
        }
        TokenSet(set)
    }

    pub const fn union(self, other: TokenSet) -> TokenSet {
        TokenSet(self.0 | other.0)
    }

    pub const fn contains(&self, kind: SyntaxKind) -> bool {
        let token = kind as usize;
        token <= LAST_TOKEN && self.0 & (1 << token) != 0
    }
}

#[test]
fn test_token_set() {
    let set = TokenSet::new(&[SyntaxKind::BREAK]);
    assert!(set.contains(SyntaxKind::BREAK));
    assert!(!set.contains(SyntaxKind::LEFT_CURLY));
    let set = TokenSet::new(&[SyntaxKind::BEGIN, SyntaxKind::END]).union(set);
    assert!(set.contains(SyntaxKind::BREAK));
    assert!(set.contains(SyntaxKind::BEGIN));
    assert!(set.contains(SyntaxKind::END));
    assert!(!set.contains(SyntaxKind::Paragraph));
}
