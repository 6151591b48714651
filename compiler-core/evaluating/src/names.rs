//! Free-name closures of blocks.
//!
//! The result of evaluating a block depends on its own text and on every
//! binding it can reach: names it uses directly, names used by the bodies of
//! the macros those resolve to, and the documents it includes. The closure
//! over-approximates this set syntactically, so that its fingerprint can key
//! the evaluation cache.

use building_types::Fingerprint;
use rowan::ast::AstNode;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use syntax::{SyntaxKind, SyntaxNode, cst};

use crate::{Environment, Include, Includes, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameClosure {
    /// Every reachable name with the fingerprint of what it resolves to.
    pub names: Vec<(SmolStr, Fingerprint)>,
    /// Every include name that expansion can reach.
    pub includes: Vec<SmolStr>,
}

impl NameClosure {
    /// The evaluation key of a block with the given content fingerprint.
    pub fn key(&self, block: Fingerprint, includes: &Includes) -> Fingerprint {
        let names = self.names.iter().map(|(name, fingerprint)| {
            Fingerprint::of(name.as_str()).combine(*fingerprint)
        });
        let includes = self.includes.iter().map(|name| {
            let fingerprint = includes.get(name).map_or(Fingerprint::ZERO, Include::fingerprint);
            Fingerprint::of(name.as_str()).combine(fingerprint)
        });
        Fingerprint::combine_all(std::iter::once(block).chain(names).chain(includes))
    }
}

pub fn name_closure(block: &SyntaxNode, module: &Environment, includes: &Includes) -> NameClosure {
    let mut seen = FxHashSet::default();
    let mut names = vec![];
    let mut include_names = FxHashSet::default();
    let mut worklist = vec![block.clone()];

    while let Some(node) = worklist.pop() {
        for descendant in node.descendants() {
            let name = match descendant.kind() {
                SyntaxKind::Command => cst::Command::cast(descendant.clone()).and_then(|c| c.name()),
                SyntaxKind::Group => cst::Group::cast(descendant.clone()).and_then(|g| symbol(&g)),
                _ => None,
            };
            let Some(name) = name else { continue };

            if name == "include" {
                let argument = cst::Command::cast(descendant).and_then(|c| c.arguments().next());
                if let Some(argument) = argument {
                    let target = SmolStr::from(argument.plain_text());
                    if let Some(Include::Resolved(document)) = includes.get(&target) {
                        if !include_names.contains(&target) {
                            let bodies = document.exports.iter().map(|m| m.body.clone());
                            worklist.extend(bodies.map(SyntaxNode::new_root));
                        }
                    }
                    include_names.insert(target);
                }
            }

            if !seen.insert(name.clone()) {
                continue;
            }

            let fingerprint = match module.lookup(&name) {
                Some(value @ Value::Builtin(_)) => value.fingerprint(),
                Some(value @ Value::Macro(definition)) => {
                    worklist.push(SyntaxNode::new_root(definition.body.clone()));
                    value.fingerprint()
                }
                None => Fingerprint::of(&("unbound", name.as_str())),
            };
            names.push((name, fingerprint));
        }
    }

    names.sort();
    let mut includes: Vec<_> = include_names.into_iter().collect();
    includes.sort();

    NameClosure { names, includes }
}

/// A group consisting of a single identifier, such as `{name}`, refers to
/// the binding of that name.
pub fn symbol(group: &cst::Group) -> Option<SmolStr> {
    let mut contents = group.contents().filter(|element| !element.kind().is_trivia());
    let token = contents.next()?.into_token()?;
    if contents.next().is_some() || token.kind() != SyntaxKind::WORD {
        return None;
    }
    let text = token.text();
    is_identifier(text).then(|| SmolStr::from(text))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(first) = chars.next() else { return false };
    first.is_alphabetic() && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ':'))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rowan::ast::AstNode;
    use syntax::cst;

    use super::{name_closure, symbol};
    use crate::{Environment, Includes, Macro};

    fn first_group(source: &str) -> cst::Group {
        let (parsed, _) = parsing::parse_text(source);
        parsed.syntax_node().descendants().find_map(cst::Group::cast).unwrap()
    }

    #[test]
    fn test_symbol() {
        assert_eq!(symbol(&first_group("{name}")).as_deref(), Some("name"));
        assert_eq!(symbol(&first_group("{ name }")).as_deref(), Some("name"));
        assert_eq!(symbol(&first_group("{fig:one}")).as_deref(), Some("fig:one"));
        assert_eq!(symbol(&first_group("{two words}")), None);
        assert_eq!(symbol(&first_group("{2}")), None);
        assert_eq!(symbol(&first_group("{end.}")), None);
    }

    #[test]
    fn test_closure_follows_macro_bodies() {
        let (definitions, _) = parsing::parse_text(r"\def{outer}{\inner} \def{inner}{x}");
        let global = Environment::global();
        let mut module = Environment::module(&global);
        for definition in definitions.syntax_node().descendants().filter_map(cst::Definition::cast) {
            let name = definition.name().unwrap().plain_text();
            let body = definition.body().unwrap().syntax().green().into_owned();
            module.define(Arc::new(Macro::new(name.into(), 0, body, None)));
        }

        let (block, _) = parsing::parse_text(r"Use \outer and {missing} \emph{x}");
        let closure = name_closure(&block.syntax_node(), &module, &Includes::default());
        let names: Vec<_> = closure.names.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["emph", "inner", "missing", "outer"]);
    }

    #[test]
    fn test_closure_collects_includes() {
        let (block, _) = parsing::parse_text(r"\include{b} \include{a}");
        let global = Environment::global();
        let closure = name_closure(&block.syntax_node(), &global, &Includes::default());
        assert_eq!(closure.includes, ["a", "b"]);
    }
}
